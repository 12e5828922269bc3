// =============================================================================
// column_scanner.rs — WHAT IS THIS COLUMN, REALLY?
// =============================================================================
//
// Real-world tables never agree on header names. "Phone", "phone_number",
// "Mobile Phone", "TELEPHONE" are all the same thing to a human. This module
// gives the cleaner and the acquirer the same answer a human would give.
//
// One Aho-Corasick automaton per role, built once, ASCII case-insensitive.
// A header is run through every automaton; the role with the most keyword
// hits wins, and ties go to the role listed first in `ROLE_PRIORITY`.
// =============================================================================

use std::fmt;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use serde::Serialize;
use tracing::debug;

/// The semantic role a header suggests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Scratch columns nobody wants in the output.
    Unused,
    /// Yes/no flags such as do-not-contact.
    Flag,
    Phone,
    Email,
    /// Personal names.
    Name,
    /// A single free-form address line.
    Address,
    /// Money amounts, typically with `$` and thousands separators.
    Currency,
    Other,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnRole::Unused => "unused",
            ColumnRole::Flag => "flag",
            ColumnRole::Phone => "phone",
            ColumnRole::Email => "email",
            ColumnRole::Name => "name",
            ColumnRole::Address => "address",
            ColumnRole::Currency => "currency",
            ColumnRole::Other => "other",
        };
        write!(f, "{s}")
    }
}

static UNUSED_KEYWORDS: &[&str] = &["not_useful", "not useful", "unused"];

static FLAG_KEYWORDS: &[&str] = &[
    "do_not_contact",
    "do not contact",
    "donotcontact",
    "paying_customer",
    "paying customer",
    "active",
    "opt_out",
    "opt-out",
    "subscribed",
];

static PHONE_KEYWORDS: &[&str] = &["phone", "telephone", "mobile"];

static EMAIL_KEYWORDS: &[&str] = &["email", "e-mail"];

static NAME_KEYWORDS: &[&str] = &[
    "first_name",
    "first name",
    "firstname",
    "last_name",
    "last name",
    "lastname",
    "full_name",
    "full name",
    "surname",
];

static ADDRESS_KEYWORDS: &[&str] = &["address"];

static CURRENCY_KEYWORDS: &[&str] = &["revenue", "profit", "sales", "income", "usd"];

/// Roles in tie-break order. Flag beats Phone ("phone_opt_out" is a flag),
/// Email beats Address ("email address" is an email).
const ROLE_PRIORITY: &[ColumnRole] = &[
    ColumnRole::Unused,
    ColumnRole::Flag,
    ColumnRole::Email,
    ColumnRole::Phone,
    ColumnRole::Name,
    ColumnRole::Address,
    ColumnRole::Currency,
];

fn build(keywords: &[&str]) -> AhoCorasick {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(keywords)
        .expect("static column keywords always compile")
}

static UNUSED_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(UNUSED_KEYWORDS));
static FLAG_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(FLAG_KEYWORDS));
static PHONE_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(PHONE_KEYWORDS));
static EMAIL_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(EMAIL_KEYWORDS));
static NAME_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(NAME_KEYWORDS));
static ADDRESS_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(ADDRESS_KEYWORDS));
static CURRENCY_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build(CURRENCY_KEYWORDS));

fn automaton(role: ColumnRole) -> Option<&'static AhoCorasick> {
    Some(match role {
        ColumnRole::Unused => &*UNUSED_AUTOMATON,
        ColumnRole::Flag => &*FLAG_AUTOMATON,
        ColumnRole::Phone => &*PHONE_AUTOMATON,
        ColumnRole::Email => &*EMAIL_AUTOMATON,
        ColumnRole::Name => &*NAME_AUTOMATON,
        ColumnRole::Address => &*ADDRESS_AUTOMATON,
        ColumnRole::Currency => &*CURRENCY_AUTOMATON,
        ColumnRole::Other => return None,
    })
}

/// Result of scanning one header.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnScan {
    pub column: String,
    pub role: ColumnRole,
    /// Keyword hits for the winning role.
    pub hits: usize,
    pub matched_keywords: Vec<String>,
}

/// Classify a single header.
pub fn classify(column: &str) -> ColumnScan {
    let mut best: Option<(ColumnRole, usize)> = None;
    for &role in ROLE_PRIORITY {
        let Some(ac) = automaton(role) else { continue };
        let hits = ac.find_iter(column).count();
        if hits > 0 && best.map_or(true, |(_, h)| hits > h) {
            best = Some((role, hits));
        }
    }

    let (role, hits) = best.unwrap_or((ColumnRole::Other, 0));
    let matched_keywords = match automaton(role) {
        Some(ac) => {
            let mut kws: Vec<String> = ac
                .find_iter(column)
                .map(|m| column[m.start()..m.end()].to_ascii_lowercase())
                .collect();
            kws.sort();
            kws.dedup();
            kws
        }
        None => Vec::new(),
    };

    debug!(column = column, role = %role, hits = hits, "Column classified");

    ColumnScan {
        column: column.to_string(),
        role,
        hits,
        matched_keywords,
    }
}

/// Classify every header, preserving order.
pub fn scan_columns<S: AsRef<str>>(columns: &[S]) -> Vec<ColumnScan> {
    columns.iter().map(|c| classify(c.as_ref())).collect()
}

/// Headers whose role is `role`, in dataset order.
pub fn columns_with_role<S: AsRef<str>>(columns: &[S], role: ColumnRole) -> Vec<String> {
    columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| classify(c).role == role)
        .map(|c| c.to_string())
        .collect()
}

/// Case-insensitive substring test for one keyword, SIMD-accelerated.
pub fn header_contains(column: &str, keyword: &str) -> bool {
    let haystack = column.to_ascii_lowercase();
    let needle = keyword.to_ascii_lowercase();
    memchr::memmem::find(haystack.as_bytes(), needle.as_bytes()).is_some()
}
