//! Parsers for `/proc/[pid]` files.
//!
//! Pure functions over file contents, testable with string inputs.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Fields of `/proc/[pid]/stat` the locator needs.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub utime: u64,
    pub stime: u64,
    /// Start time in clock ticks since boot. Stable for the life of a
    /// process, so it tells a reused PID apart from the original.
    pub starttime: u64,
    /// Resident set size in pages.
    pub rss: i64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// `comm` may contain spaces and parentheses, so fields are counted from the
/// last `)` rather than split naively.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    // fields[0] is the state (field 3 in proc(5) numbering).
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let parse_field_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields
            .get(idx)
            .ok_or_else(|| ParseError::new(format!("missing field {}", name)))?
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        utime: parse_field_u64(11, "utime")?,
        stime: parse_field_u64(12, "stime")?,
        starttime: parse_field_u64(19, "starttime")?,
        rss: fields[21]
            .parse()
            .map_err(|_| ParseError::new("invalid rss"))?,
    })
}

/// Fields of `/proc/[pid]/status` the locator needs.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    pub name: String,
    /// Resident memory in kB. `None` for kernel threads and zombies, which
    /// have no `VmRSS` line.
    pub vm_rss: Option<u64>,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    if fields.is_empty() {
        return Err(ParseError::new("empty status"));
    }

    // Memory fields are in kB format: "12345 kB"
    let vm_rss = fields
        .get("VmRSS")
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse().ok());

    Ok(ProcStatus {
        name: fields.get("Name").unwrap_or(&"").to_string(),
        vm_rss,
    })
}

/// Splits a NUL-separated `/proc/[pid]/cmdline` into its arguments.
pub fn parse_cmdline(content: &str) -> Vec<&str> {
    content.split('\0').filter(|arg| !arg.is_empty()).collect()
}
