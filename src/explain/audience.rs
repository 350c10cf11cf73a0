//! Audience derivation from caller roles

pub const TRADING_ANALYST: &str = "TRADING_ANALYST";
pub const COMPLIANCE: &str = "COMPLIANCE";
pub const TRADING_VIEWER: &str = "TRADING_VIEWER";

const ROLE_TRADING_ANALYST: &str = "TRADING_ANALYST";
const ROLE_COMPLIANCE_AUDITOR: &str = "COMPLIANCE_AUDITOR";

/// Analyst beats auditor; everyone else gets the viewer register.
pub fn derive_audience(roles: &[String]) -> &'static str {
    let has = |role: &str| roles.iter().any(|r| r == role);
    if has(ROLE_TRADING_ANALYST) {
        TRADING_ANALYST
    } else if has(ROLE_COMPLIANCE_AUDITOR) {
        COMPLIANCE
    } else {
        TRADING_VIEWER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_derive() {
        assert_eq!(derive_audience(&roles(&["COMPLIANCE_AUDITOR", "TRADING_ANALYST"])), TRADING_ANALYST);
        assert_eq!(derive_audience(&roles(&["COMPLIANCE_AUDITOR"])), COMPLIANCE);
        assert_eq!(derive_audience(&roles(&["ADMIN"])), TRADING_VIEWER);
        assert_eq!(derive_audience(&[]), TRADING_VIEWER);
    }
}
