// src/exchanges/doctypes.rs
//! Per-exchange document-type lookup tables.
//!
//! Keys are the names accepted by `--doctype`; values are whatever the
//! exchange needs to select that type (a `t2code`, a title pattern, or a
//! list of EDGAR form types).

/// HKEX news `t2code` values. Unknown keys fall back to `-2` (no filter).
pub const HKEX_DOC_TYPES: &[(&str, &str)] = &[
    ("all", "-2"),
    ("annual_report", "40100"),
    ("interim_report", "40200"),
    ("quarterly_report", "40300"),
    ("esg_report", "40400"),
];

pub const HKEX_ALL_T2CODE: &str = "-2";

/// CNINFO title patterns matched against `F002V`.
pub const CNINFO_DOC_TYPES: &[(&str, &str)] = &[
    ("all", ""),
    ("periodic_report", "度报告"),
    ("interim_report", "半年度报告$"),
    ("annual_report", "年年度报告$"),
    ("quarterly_report", "季度报告全文$"),
    ("presentation", "演示文稿"),
    ("prospectus", "首次公开发行股票招股说明书"),
    ("esg_report", "ESG|社会责任"),
];

/// EDGAR form types, `|`-separated. Empty means every form.
pub const EDGAR_DOC_TYPES: &[(&str, &str)] = &[
    ("all", ""),
    ("annual_report", "10-K|10-K/A|20-F|40-F"),
    ("quarterly_report", "10-Q|10-Q/A"),
    ("current_report", "8-K|6-K"),
    ("proxy_statement", "DEF 14A"),
    ("prospectus", "S-1|F-1|424B4"),
];

/// Looks up `doc_type` in one of the tables above.
pub fn lookup(table: &'static [(&'static str, &'static str)], doc_type: &str) -> Option<&'static str> {
    table.iter().find(|(key, _)| *key == doc_type).map(|(_, value)| *value)
}

pub fn keys(table: &'static [(&'static str, &'static str)]) -> Vec<&'static str> {
    table.iter().map(|(key, _)| *key).collect()
}
