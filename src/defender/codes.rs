//! Display names for the engine's numeric codes.
//!
//! Unmapped codes decode to `"Unknown"`.

/// Name of a threat severity id.
pub fn severity_name(id: i64) -> &'static str {
    match id {
        1 => "Low",
        2 => "Moderate",
        3 => "High",
        4 => "Severe",
        _ => "Unknown",
    }
}

/// Name of a threat status id.
pub fn threat_status_name(id: i64) -> &'static str {
    match id {
        1 => "Detected",
        2 => "Cleaned",
        3 => "Quarantined",
        4 => "Removed",
        5 => "Allowed",
        6 => "Blocked",
        _ => "Unknown",
    }
}

/// Name of a cleaning action id.
pub fn cleaning_action_name(id: i64) -> &'static str {
    match id {
        1 => "Clean",
        2 => "Quarantine",
        3 => "Remove",
        6 => "Allow",
        10 => "Block",
        _ => "Unknown",
    }
}

/// Name of a threat type id.
pub fn threat_type_name(id: i64) -> &'static str {
    match id {
        0 => "Known Bad",
        1 => "Behavior",
        3 => "Known Good",
        4 => "NRI",
        _ => "Unknown",
    }
}

/// Name of a detection source id.
pub fn detection_source_name(id: i64) -> &'static str {
    match id {
        1 => "User",
        2 => "System",
        3 => "Realtime",
        4 => "IOAV",
        5 => "NRI",
        7 => "ELAM",
        _ => "Unknown",
    }
}

/// Name of a threat category id.
pub fn category_name(id: i64) -> &'static str {
    match id {
        0 => "INVALID",
        1 => "ADWARE",
        2 => "SPYWARE",
        3 => "PASSWORDSTEALER",
        4 => "TROJANDOWNLOADER",
        5 => "WORM",
        6 => "BACKDOOR",
        7 => "REMOTEACCESSTROJAN",
        8 => "TROJAN",
        9 => "EMAILFLOODER",
        10 => "KEYLOGGER",
        11 => "DIALER",
        12 => "MONITORINGSOFTWARE",
        13 => "BROWSERMODIFIER",
        14 => "COOKIE",
        15 => "BROWSERPLUGIN",
        16 => "AOLEXPLOIT",
        17 => "NUKER",
        18 => "SECURITYDISABLER",
        19 => "JOKEPROGRAM",
        20 => "HOSTILEACTIVEXCONTROL",
        21 => "SOFTWAREBUNDLER",
        22 => "STEALTHNOTIFIER",
        23 => "SETTINGSMODIFIER",
        24 => "TOOLBAR",
        25 => "REMOTECONTROLSOFTWARE",
        26 => "TROJANFTP",
        27 => "POTENTIALUNWANTEDSOFTWARE",
        28 => "ICQEXPLOIT",
        29 => "TROJANTELNET",
        30 => "EXPLOIT",
        31 => "FILESHARINGPROGRAM",
        32 => "MALWARE_CREATION_TOOL",
        33 => "REMOTE_CONTROL_SOFTWARE",
        34 => "TOOL",
        36 => "TROJAN_DENIALOFSERVICE",
        37 => "TROJAN_DROPPER",
        38 => "TROJAN_MASSMAILER",
        39 => "TROJAN_MONITORINGSOFTWARE",
        40 => "TROJAN_PROXYSERVER",
        42 => "VIRUS",
        43 => "KNOWN",
        44 => "UNKNOWN",
        45 => "SPP",
        46 => "BEHAVIOR",
        47 => "VULNERABILITY",
        48 => "POLICY",
        49 => "ENTERPRISEUNWANTEDSOFTWARE",
        50 => "RANSOMWARE",
        51 => "ASR_RULE",
        _ => "Unknown",
    }
}

/// Name of a computer state bit value, or `Unknown (n)`.
pub fn computer_state_name(id: i64) -> String {
    let name = match id {
        0 => "Clean",
        1 => "Pending Full Scan",
        2 => "Pending Reboot",
        4 => "Pending Manual Steps",
        6 => "Pending Offline Scan",
        8 => "Pending Critical Failure Recovery",
        _ => return format!("Unknown ({id})"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(severity_name(4), "Severe");
        assert_eq!(threat_status_name(3), "Quarantined");
        assert_eq!(cleaning_action_name(10), "Block");
        assert_eq!(threat_type_name(0), "Known Bad");
        assert_eq!(detection_source_name(7), "ELAM");
        assert_eq!(category_name(50), "RANSOMWARE");
        assert_eq!(computer_state_name(2), "Pending Reboot");
    }

    #[test]
    fn test_unmapped_codes() {
        assert_eq!(severity_name(0), "Unknown");
        assert_eq!(severity_name(99), "Unknown");
        assert_eq!(threat_status_name(-1), "Unknown");
        assert_eq!(cleaning_action_name(4), "Unknown");
        assert_eq!(threat_type_name(2), "Unknown");
        assert_eq!(detection_source_name(6), "Unknown");
        assert_eq!(category_name(35), "Unknown");
        assert_eq!(computer_state_name(3), "Unknown (3)");
    }
}
