//! Statement guard - classifies raw SQL before it reaches the database
//!
//! A textual deny-list filter. This is best-effort defense in depth, not a
//! security boundary: comments, encoding tricks, and stored-procedure
//! indirection can evade a regex. Least-privilege database credentials are
//! the real control.

use regex::Regex;

/// Fixed message carried by the envelope when a statement is blocked.
pub const UNSAFE_QUERY_MESSAGE: &str =
    "Query contains potentially unsafe operations and was blocked for security";

/// Statements that must never reach the server: destructive DDL, privilege
/// changes, and execution/reconfiguration primitives.
const DENY_PATTERNS: &[&str] = &[
    r"(?i)\bDROP\s",
    r"(?i)\bTRUNCATE\s",
    r"(?i)\bALTER\s+ROLE\s",
    r"(?i)\bCREATE\s+LOGIN\s",
    r"(?i)\bALTER\s+LOGIN\s",
    r"(?i)\bCREATE\s+USER\s",
    r"(?i)\bALTER\s+USER\s",
    r"(?i)\bEXEC\s*[\s(]",
    r"(?i)\bEXECUTE\s*[\s(]",
    r"(?i)xp_cmdshell",
    r"(?i)sp_configure",
    r"(?i)\bRECONFIGURE\b",
    r"(?i)\bGRANT\s",
    r"(?i)\bREVOKE\s",
    r"(?i)\bDENY\s",
];

/// Classification of one raw SQL string. Stateless; recomputed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the statement may run at all.
    pub permitted: bool,
    /// Whether the statement is a plain SELECT (only meaningful when
    /// `permitted` is true).
    pub read_only: bool,
}

/// Deny-list guard with patterns compiled once at startup.
pub struct StatementGuard {
    deny: Vec<Regex>,
}

impl StatementGuard {
    pub fn new() -> Self {
        let deny = DENY_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern).expect("built-in deny pattern must compile"))
            .collect();
        Self { deny }
    }

    /// Classify a raw statement. Any deny-list match wins; otherwise the
    /// statement is read-only iff it starts with SELECT after trimming,
    /// case-insensitively.
    pub fn classify(&self, sql: &str) -> Verdict {
        for pattern in &self.deny {
            if pattern.is_match(sql) {
                tracing::warn!(pattern = pattern.as_str(), "statement matched deny pattern");
                return Verdict {
                    permitted: false,
                    read_only: false,
                };
            }
        }

        let read_only = sql.trim().to_uppercase().starts_with("SELECT");
        Verdict {
            permitted: true,
            read_only,
        }
    }
}

impl Default for StatementGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(sql: &str) -> Verdict {
        StatementGuard::new().classify(sql)
    }

    #[test]
    fn destructive_ddl_is_denied() {
        assert!(!classify("DROP TABLE Users").permitted);
        assert!(!classify("TRUNCATE TABLE Orders").permitted);
        assert!(!classify("  drop   view Reports").permitted);
    }

    #[test]
    fn deny_is_case_insensitive_across_whitespace_runs() {
        assert!(!classify("dRoP\t\n TABLE Users").permitted);
        assert!(!classify("create\n\tlogin evil WITH PASSWORD = 'x'").permitted);
        assert!(!classify("SELECT 1; GRANT CONTROL TO evil").permitted);
    }

    #[test]
    fn privilege_changes_are_denied() {
        assert!(!classify("ALTER ROLE db_owner ADD MEMBER evil").permitted);
        assert!(!classify("CREATE USER evil FOR LOGIN evil").permitted);
        assert!(!classify("ALTER USER evil WITH LOGIN = other").permitted);
        assert!(!classify("REVOKE SELECT ON Orders FROM reader").permitted);
        assert!(!classify("DENY SELECT ON Orders TO reader").permitted);
    }

    #[test]
    fn execution_primitives_are_denied() {
        assert!(!classify("EXEC sp_who").permitted);
        assert!(!classify("EXECUTE(@stmt)").permitted);
        assert!(!classify("EXEC(@stmt)").permitted);
        assert!(!classify("SELECT 1; exec xp_cmdshell 'dir'").permitted);
        assert!(!classify("EXEC sp_configure 'show advanced options', 1").permitted);
        assert!(!classify("RECONFIGURE").permitted);
    }

    #[test]
    fn word_boundaries_spare_lookalike_identifiers() {
        assert!(classify("SELECT backdrop_id FROM Scenes").permitted);
        assert!(classify("SELECT executor FROM Jobs").permitted);
    }

    #[test]
    fn select_is_read_only() {
        let verdict = classify("  select * from Orders");
        assert!(verdict.permitted);
        assert!(verdict.read_only);
    }

    #[test]
    fn non_select_statements_are_mutating() {
        let insert = classify("INSERT INTO Orders (Id) VALUES (1)");
        assert!(insert.permitted);
        assert!(!insert.read_only);

        let cte = classify("WITH recent AS (SELECT 1 AS n) SELECT n FROM recent");
        assert!(cte.permitted);
        assert!(!cte.read_only);
    }
}
