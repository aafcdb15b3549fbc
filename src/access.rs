//! The access decision for files: ownership, explicit grants and bearer
//! share links all funnel through one predicate so metadata fetch and
//! download can never drift apart in what they allow.

use chrono::{DateTime, Utc};

use crate::models::file::{FileRecord, ShareLink};

/// Whether a share link is currently usable. Absent links are invalid;
/// a link with no expiry never expires. The comparison is strict: a link
/// whose expiry equals the evaluation instant is still valid.
pub fn link_is_valid(link: Option<&ShareLink>) -> bool {
    link_is_valid_at(link, Utc::now())
}

pub fn link_is_valid_at(link: Option<&ShareLink>, now: DateTime<Utc>) -> bool {
    match link {
        None => false,
        Some(l) => match l.expires_at {
            Some(expires_at) => !(expires_at < now),
            None => true,
        },
    }
}

/// The access predicate: owner, explicit grant, or a valid token, in that
/// order. Each condition is sufficient on its own.
pub fn can_access(user_id: Option<&str>, file: &FileRecord, token: Option<&str>) -> bool {
    can_access_at(user_id, file, token, Utc::now())
}

pub fn can_access_at(
    user_id: Option<&str>,
    file: &FileRecord,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    if let Some(uid) = user_id {
        if file.owner_id == uid {
            return true;
        }
        if file.shared_with.iter().any(|id| id == uid) {
            return true;
        }
    }
    if let Some(token) = token {
        // Linear scan; a file only ever carries a handful of links.
        let found = file.share_links.iter().find(|l| l.token == token);
        if link_is_valid_at(found, now) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(owner: &str, shared_with: &[&str], links: Vec<ShareLink>) -> FileRecord {
        FileRecord {
            id: "f1".into(),
            owner_id: owner.into(),
            original_name: "report.pdf".into(),
            stored_name: "deadbeef.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 1024,
            upload_date: Utc::now(),
            shared_with: shared_with.iter().map(|s| s.to_string()).collect(),
            share_links: links,
        }
    }

    fn link(token: &str, expires_at: Option<DateTime<Utc>>) -> ShareLink {
        ShareLink {
            token: token.into(),
            expires_at,
        }
    }

    #[test]
    fn missing_link_is_invalid() {
        assert!(!link_is_valid(None));
    }

    #[test]
    fn link_without_expiry_never_expires() {
        let l = link("t", None);
        assert!(link_is_valid_at(Some(&l), Utc::now() + Duration::days(365 * 100)));
    }

    #[test]
    fn expiry_comparison_is_strict() {
        let now = Utc::now();
        let l = link("t", Some(now));
        // exactly-now is not yet expired
        assert!(link_is_valid_at(Some(&l), now));
        assert!(!link_is_valid_at(Some(&l), now + Duration::seconds(1)));
    }

    #[test]
    fn past_expiry_is_invalid_immediately() {
        let l = link("t", Some(Utc::now() - Duration::seconds(1)));
        assert!(!link_is_valid(Some(&l)));
    }

    #[test]
    fn owner_always_allowed() {
        let f = record("alice", &[], vec![]);
        assert!(can_access(Some("alice"), &f, None));
    }

    #[test]
    fn granted_user_allowed() {
        let f = record("alice", &["bob"], vec![]);
        assert!(can_access(Some("bob"), &f, None));
    }

    #[test]
    fn stranger_denied_without_token() {
        let f = record("alice", &["bob"], vec![]);
        assert!(!can_access(Some("carol"), &f, None));
        assert!(!can_access(None, &f, None));
    }

    #[test]
    fn anonymous_valid_token_allowed() {
        let f = record("alice", &[], vec![link("tok", None)]);
        assert!(can_access(None, &f, Some("tok")));
    }

    #[test]
    fn wrong_token_denied() {
        let f = record("alice", &[], vec![link("tok", None)]);
        assert!(!can_access(None, &f, Some("other")));
    }

    #[test]
    fn expired_token_denied_but_owner_still_allowed() {
        let dead = link("tok", Some(Utc::now() - Duration::hours(1)));
        let f = record("alice", &[], vec![dead]);
        assert!(!can_access(Some("carol"), &f, Some("tok")));
        assert!(can_access(Some("alice"), &f, Some("tok")));
    }

    #[test]
    fn token_scan_finds_later_links() {
        let now = Utc::now();
        let f = record(
            "alice",
            &[],
            vec![
                link("old", Some(now - Duration::days(1))),
                link("fresh", Some(now + Duration::days(1))),
            ],
        );
        assert!(!can_access_at(None, &f, Some("old"), now));
        assert!(can_access_at(None, &f, Some("fresh"), now));
    }
}
