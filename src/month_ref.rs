//! Reference-month ("mRef") parsing.
//!
//! Plans carry a free-text billing month like `"jan 24"`, `"março"` or
//! `"set/2023"`. Month names are Portuguese, 3-letter or full form.

/// Month-name table, 0-based. Short forms first (the level regex relies on
/// this order), then full names including the unaccented "marco".
pub(crate) const MONTH_NAMES: &[(&str, u32)] = &[
    ("jan", 0),
    ("fev", 1),
    ("mar", 2),
    ("abr", 3),
    ("mai", 4),
    ("jun", 5),
    ("jul", 6),
    ("ago", 7),
    ("set", 8),
    ("out", 9),
    ("nov", 10),
    ("dez", 11),
    ("janeiro", 0),
    ("fevereiro", 1),
    ("março", 2),
    ("marco", 2),
    ("abril", 3),
    ("maio", 4),
    ("junho", 5),
    ("julho", 6),
    ("agosto", 7),
    ("setembro", 8),
    ("outubro", 9),
    ("novembro", 10),
    ("dezembro", 11),
];

/// 0-based month for a Portuguese month name (any case), or None.
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, m)| *m)
}

/// A parsed reference month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefMonth {
    /// 0-based month.
    pub month: u32,
    pub year: i32,
}

impl RefMonth {
    /// True when this reference month is strictly after (year, 0-based month).
    pub fn is_after(&self, year: i32, month: u32) -> bool {
        self.year > year || (self.year == year && self.month > month)
    }
}

/// Parse a free-text mRef like `"jan 24"` into month and year.
///
/// - Empty or `"n/a"` ⇒ None.
/// - First token must be a known month name; optional second token is the
///   year (2-digit years are 2000-based). Tokens split on whitespace or `/`.
/// - Years outside 2000–2100 ⇒ None. A missing year uses `default_year`,
///   which is range-checked the same way.
pub fn parse_ref(text: &str, default_year: i32) -> Option<RefMonth> {
    let clean = text.trim().to_lowercase();
    if clean.is_empty() || clean == "n/a" {
        return None;
    }

    let mut tokens = clean.split(|c: char| c.is_whitespace() || c == '/').filter(|t| !t.is_empty());
    let month = month_from_name(tokens.next()?)?;

    let year = match tokens.next() {
        Some(tok) => {
            let parsed: i32 = tok.parse().ok()?;
            if tok.len() == 2 {
                parsed + 2000
            } else {
                parsed
            }
        }
        None => default_year,
    };

    if !(2000..=2100).contains(&year) {
        return None;
    }
    Some(RefMonth { month, year })
}
