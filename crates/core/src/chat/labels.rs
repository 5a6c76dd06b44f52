//! Display names for ticket status and priority codes.

use crate::ticket::COMPLETE_STATUS;

const STATUSES: &[(i32, &str)] = &[
    (1, "New"),
    (5, "Complete"),
    (7, "Waiting Customer"),
    (8, "Customer note added"),
    (10, "Scheduled"),
    (12, "Help Desk"),
    (13, "Follow Up"),
    (14, "Waiting Materials"),
    (15, "In Progress"),
    (16, "Waiting Vendor"),
    (17, "Waiting Customer 2"),
    (22, "Client Non-Responsive"),
    (31, "Pending Customer Confirm"),
    (34, "Waiting Customer 3"),
    (35, "Requires OnSite Visit"),
    (36, "Customer Reopened"),
    (37, "Stuck"),
    (38, "Condition Reset"),
    (39, "Assigned"),
];

const PRIORITIES: &[(i32, &str)] = &[(1, "High"), (2, "Medium"), (3, "Low"), (4, "Critical")];

pub fn status_name(code: i32) -> String {
    lookup(STATUSES, code).unwrap_or_else(|| format!("Status {}", code))
}

pub fn priority_name(code: i32) -> String {
    lookup(PRIORITIES, code).unwrap_or_else(|| format!("Priority {}", code))
}

/// `true` for every status except Complete.
pub fn is_open_status(code: i32) -> bool {
    code != COMPLETE_STATUS
}

fn lookup(table: &[(i32, &str)], code: i32) -> Option<String> {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
}

/// `"1=New, 5=Complete, ..."`, as listed in the translator prompt.
pub(crate) fn status_table() -> String {
    render(STATUSES)
}

pub(crate) fn priority_table() -> String {
    render(PRIORITIES)
}

fn render(table: &[(i32, &str)]) -> String {
    table
        .iter()
        .map(|(code, name)| format!("{}={}", code, name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(status_name(1), "New");
        assert_eq!(status_name(5), "Complete");
        assert_eq!(status_name(39), "Assigned");
        assert_eq!(priority_name(4), "Critical");
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(status_name(99), "Status 99");
        assert_eq!(priority_name(0), "Priority 0");
    }

    #[test]
    fn test_only_complete_is_closed() {
        assert!(!is_open_status(5));
        assert!(is_open_status(1));
        assert!(is_open_status(36));
    }

    #[test]
    fn test_tables() {
        assert!(status_table().starts_with("1=New, 5=Complete"));
        assert_eq!(priority_table(), "1=High, 2=Medium, 3=Low, 4=Critical");
    }
}
