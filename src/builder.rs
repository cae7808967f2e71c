use crate::error::Error;
use regex::Regex;

/// Tokens the scanner recognises, leftmost-first.
///
/// Quoted literals, quoted identifiers and comments are matched whole so that
/// a `:word` inside them is never taken for a placeholder. `::` and `:=` are
/// plain SQL. A bare `?` would collide with the rendered positional markers.
/// A quote or comment opener that survives to the last alternative is
/// unterminated.
const TOKEN_PATTERN: &str = concat!(
    r"'(?:[^'\\]|\\.|'')*'",
    r#"|"(?:[^"\\]|\\.|"")*""#,
    r"|`[^`]*`",
    r"|--[^\n]*",
    r"|[#][^\n]*",
    r"|(?s:/\*.*?\*/)",
    r"|::|:=",
    r"|:(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
    r"|:(?P<bad>[0-9][A-Za-z0-9_]*)",
    r"|(?P<positional>\?)",
    r#"|(?P<open>['"`]|/\*)"#,
);

/// One piece of a parsed SQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// SQL text emitted verbatim.
    Sql(String),
    /// A `:name` placeholder, stored without the colon.
    Placeholder(String),
}

/// A SQL template split into verbatim text and named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    segments: Vec<Segment>,
}

impl ParsedTemplate {
    /// Parses `:name` placeholders out of `template`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] for a placeholder whose name starts with a
    /// digit, a positional `?` outside quoted text, or an unterminated quote,
    /// backtick or block comment.
    pub fn parse(template: &str) -> crate::Result<Self> {
        let regex = Regex::new(TOKEN_PATTERN)?;
        let mut segments = Vec::new();
        let mut sql = String::new();
        let mut last = 0;

        for caps in regex.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };

            if let Some(bad) = caps.name("bad") {
                return Err(Error::Template {
                    position: whole.start(),
                    reason: format!(
                        "placeholder ':{}' must start with a letter or underscore",
                        bad.as_str()
                    ),
                });
            }
            if caps.name("positional").is_some() {
                return Err(Error::Template {
                    position: whole.start(),
                    reason: "positional '?' markers are not supported; use :name".into(),
                });
            }
            if let Some(open) = caps.name("open") {
                return Err(Error::Template {
                    position: open.start(),
                    reason: format!("unterminated '{}'", open.as_str()),
                });
            }

            match caps.name("name") {
                Some(name) => {
                    sql.push_str(&template[last..whole.start()]);
                    if !sql.is_empty() {
                        segments.push(Segment::Sql(std::mem::take(&mut sql)));
                    }
                    segments.push(Segment::Placeholder(name.as_str().to_owned()));
                }
                None => sql.push_str(&template[last..whole.end()]),
            }
            last = whole.end();
        }

        sql.push_str(&template[last..]);
        if !sql.is_empty() {
            segments.push(Segment::Sql(sql));
        }
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in order of appearance, repeats included.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Sql(_) => None,
        })
    }

    /// Renders positional SQL, emitting `arity(name)` comma-separated `?`
    /// markers for each placeholder.
    pub fn render<F>(&self, mut arity: F) -> String
    where
        F: FnMut(&str) -> usize,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Sql(sql) => out.push_str(sql),
                Segment::Placeholder(name) => {
                    let n = arity(name).max(1);
                    for i in 0..n {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push('?');
                    }
                }
            }
        }
        out
    }
}

/// Converts named placeholders (`:name`) to positional placeholders (`?`) for MySQL.
///
/// Every placeholder becomes exactly one `?`. Use [`crate::PreparedQuery`]
/// to expand multi-valued parameters.
///
/// # Examples
///
/// ```
/// use emr_query::builder::build_query;
///
/// let sql = build_query("SELECT * FROM patient WHERE uuid = :uuid AND voided = :voided")?;
/// assert_eq!(sql, "SELECT * FROM patient WHERE uuid = ? AND voided = ?");
/// # Ok::<(), emr_query::Error>(())
/// ```
pub fn build_query(template: &str) -> crate::Result<String> {
    Ok(ParsedTemplate::parse(template)?.render(|_| 1))
}
