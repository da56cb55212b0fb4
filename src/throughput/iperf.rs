//! iperf3 JSON output model (subset of fields we care about).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Iperf3Output {
    pub start: Iperf3Start,
    pub end: Iperf3End,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Start {
    #[serde(default)]
    pub connecting_to: Option<Iperf3Peer>,
    pub test_start: Iperf3TestStart,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Peer {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3TestStart {
    pub protocol: String,
    pub num_streams: u32,
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3End {
    #[serde(default)]
    pub sum_sent: Option<Iperf3Sum>,
    #[serde(default)]
    pub sum_received: Option<Iperf3Sum>,
    #[serde(default)]
    pub cpu_utilization_percent: Option<Iperf3Cpu>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Sum {
    pub seconds: f64,
    pub bytes: u64,
    pub bits_per_second: f64,
    #[serde(default)]
    pub retransmits: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Cpu {
    pub host_total: f64,
    pub remote_total: f64,
}

/// Parse an iperf3 `--json` stdout string into a structured result.
pub fn parse_output(json_str: &str) -> Result<Iperf3Output, serde_json::Error> {
    serde_json::from_str(json_str)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CLIENT_RESULT: &str = r#"{
        "start": {
            "connecting_to": { "host": "192.168.1.5", "port": 5201 },
            "test_start": {
                "protocol": "TCP",
                "num_streams": 2,
                "duration": 10
            }
        },
        "end": {
            "sum_sent": {
                "seconds": 10.0,
                "bytes": 1187840000,
                "bits_per_second": 950272000.0,
                "retransmits": 3
            },
            "sum_received": {
                "seconds": 10.0,
                "bytes": 1181250000,
                "bits_per_second": 945000000.0
            },
            "cpu_utilization_percent": {
                "host_total": 4.8,
                "remote_total": 2.1
            }
        }
    }"#;

    #[test]
    fn test_parse_client_result() {
        let result = parse_output(CLIENT_RESULT).unwrap();
        assert_eq!(result.start.test_start.protocol, "TCP");
        assert_eq!(result.start.test_start.num_streams, 2);

        let peer = result.start.connecting_to.unwrap();
        assert_eq!(peer.host, "192.168.1.5");
        assert_eq!(peer.port, 5201);

        let received = result.end.sum_received.unwrap();
        assert_eq!(received.bytes, 1181250000);
        assert!(received.bits_per_second > 900_000_000.0);

        assert_eq!(result.end.sum_sent.unwrap().retransmits, Some(3));
    }

    #[test]
    fn test_parse_tolerates_missing_optional_sections() {
        let minimal = r#"{
            "start": {
                "test_start": { "protocol": "TCP", "num_streams": 1, "duration": 10 }
            },
            "end": {
                "sum_sent": { "seconds": 10.0, "bytes": 1000, "bits_per_second": 800.0 }
            }
        }"#;
        let result = parse_output(minimal).unwrap();
        assert!(result.start.connecting_to.is_none());
        assert!(result.end.sum_received.is_none());
        assert!(result.end.cpu_utilization_percent.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_output("iperf3: error - unable to connect").is_err());
    }
}
