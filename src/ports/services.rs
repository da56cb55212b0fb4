//! Static table of well-known TCP ports.

/// Well-known ports and the services conventionally bound to them.
const WELL_KNOWN: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (443, "https"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "mssql"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (5672, "rabbitmq"),
    (6379, "redis"),
    (8080, "http-alt"),
    (9200, "elasticsearch"),
    (27017, "mongodb"),
];

/// Conventional service name for a port. Pure lookup; unmatched ports get `None`.
pub fn service_name(port: u16) -> Option<&'static str> {
    WELL_KNOWN
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
}

/// Reverse lookup: the default port for a service name (case-insensitive).
pub fn default_port(service: &str) -> Option<u16> {
    let service = service.to_ascii_lowercase();
    WELL_KNOWN
        .iter()
        .find(|(_, name)| *name == service)
        .map(|(p, _)| *p)
}

/// Every service name in the table, for "unknown service" error messages.
pub fn known_services() -> Vec<&'static str> {
    WELL_KNOWN.iter().map(|(_, name)| *name).collect()
}

/// Ports covered by the common-port scan.
pub fn common_ports() -> Vec<u16> {
    WELL_KNOWN.iter().map(|(p, _)| *p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_lookups() {
        assert_eq!(service_name(22), Some("ssh"));
        assert_eq!(service_name(443), Some("https"));
        assert_eq!(service_name(54321), None);
    }

    #[test]
    fn test_reverse_lookup_is_case_insensitive() {
        assert_eq!(default_port("http"), Some(80));
        assert_eq!(default_port("HTTPS"), Some(443));
        assert_eq!(default_port("gopher"), None);
    }

    #[test]
    fn test_common_ports_cover_the_usual_suspects() {
        let ports = common_ports();
        assert!(ports.contains(&22));
        assert!(ports.contains(&80));
        assert!(ports.contains(&443));
    }
}
