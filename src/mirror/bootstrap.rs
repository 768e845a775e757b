// ABOUTME: Target table bootstrap from the source's CREATE TABLE definition
// ABOUTME: Parses the DDL into a structured definition, strips foreign keys, injects tracking columns

use super::introspect;
use crate::mysql::set_foreign_key_checks;
use crate::utils::quote_ident;
use anyhow::{bail, Context, Result};
use mysql_async::prelude::*;
use mysql_async::Conn;

/// One entry of a CREATE TABLE body: either a column definition or a
/// constraint/index definition, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
enum DdlEntry {
    Column { name: String, definition: String },
    Constraint { definition: String, foreign_key: bool },
}

impl DdlEntry {
    fn definition(&self) -> &str {
        match self {
            DdlEntry::Column { definition, .. } => definition,
            DdlEntry::Constraint { definition, .. } => definition,
        }
    }
}

/// Structured form of a CREATE TABLE statement.
///
/// The body is parsed once into discrete entries so the transformation is a
/// list operation rather than text surgery; everything inside an entry stays
/// byte-identical to the source definition.
#[derive(Debug)]
struct TableDdl {
    table: String,
    entries: Vec<DdlEntry>,
    /// Table options after the closing parenthesis (ENGINE, CHARSET, ...)
    tail: String,
}

impl TableDdl {
    /// Remove every foreign-key constraint entry.
    ///
    /// The mirror is decoupled from the source's referential graph; rows may
    /// reference tables that do not exist on the target.
    fn strip_foreign_keys(&mut self) {
        self.entries.retain(|entry| {
            !matches!(
                entry,
                DdlEntry::Constraint {
                    foreign_key: true,
                    ..
                }
            )
        });
    }

    /// Append the tracking columns unless the table already carries them.
    fn inject_tracking_columns(&mut self) {
        let already_present = self.entries.iter().any(|entry| {
            matches!(entry, DdlEntry::Column { name, .. } if name == introspect::OPERATION_TYPE_COLUMN)
        });
        if already_present {
            return;
        }

        self.entries.push(DdlEntry::Column {
            name: introspect::OPERATION_TYPE_COLUMN.to_string(),
            definition: format!(
                "{} VARCHAR(10) DEFAULT 'inserted'",
                quote_ident(introspect::OPERATION_TYPE_COLUMN)
            ),
        });
        self.entries.push(DdlEntry::Column {
            name: introspect::LAST_UPDATED_COLUMN.to_string(),
            definition: format!(
                "{} TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
                quote_ident(introspect::LAST_UPDATED_COLUMN)
            ),
        });
    }

    /// Render back to SQL as an idempotent creation statement.
    fn render(&self) -> String {
        let body = self
            .entries
            .iter()
            .map(|entry| entry.definition())
            .collect::<Vec<_>>()
            .join(",\n  ");

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n){}",
            quote_ident(&self.table),
            body,
            self.tail
        )
    }
}

/// Scanner state for walking DDL text without being fooled by quoting.
#[derive(Default)]
struct QuoteState {
    in_backtick: bool,
    in_single: bool,
    in_double: bool,
}

impl QuoteState {
    fn quoted(&self) -> bool {
        self.in_backtick || self.in_single || self.in_double
    }

    /// Advance past one character, returning true if it was consumed as an
    /// escape and the following character must be skipped.
    fn step(&mut self, c: char, next: Option<char>) -> bool {
        match c {
            '`' if !self.in_single && !self.in_double => {
                // Doubled backtick inside an identifier is an escape
                if self.in_backtick && next == Some('`') {
                    return true;
                }
                self.in_backtick = !self.in_backtick;
            }
            '\'' if !self.in_backtick && !self.in_double => {
                if self.in_single && next == Some('\'') {
                    return true;
                }
                self.in_single = !self.in_single;
            }
            '"' if !self.in_backtick && !self.in_single => {
                if self.in_double && next == Some('"') {
                    return true;
                }
                self.in_double = !self.in_double;
            }
            '\\' if self.in_single || self.in_double => {
                // Backslash escape inside a string literal
                return true;
            }
            _ => {}
        }
        false
    }
}

/// Extract the first backtick-quoted identifier from a fragment.
fn first_quoted_ident(fragment: &str) -> Option<String> {
    let start = fragment.find('`')?;
    let rest = &fragment[start + 1..];
    let mut ident = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '`' {
            if chars.peek() == Some(&'`') {
                chars.next();
                ident.push('`');
                continue;
            }
            return Some(ident);
        }
        ident.push(c);
    }
    None
}

/// Split a CREATE TABLE body at top-level commas.
///
/// Commas inside parentheses (`decimal(10,2)`, index column lists), quoted
/// strings (`DEFAULT 'a,b'`, enum values), and backticked identifiers do not
/// split.
fn split_top_level(body: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut state = QuoteState::default();

    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        if state.step(c, next) {
            current.push(c);
            if let Some(escaped) = chars.next() {
                current.push(escaped);
            }
            continue;
        }

        if !state.quoted() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    entries.push(current.trim().to_string());
                    current.clear();
                    continue;
                }
                _ => {}
            }
        }
        current.push(c);
    }

    let last = current.trim();
    if !last.is_empty() {
        entries.push(last.to_string());
    }
    entries
}

/// Classify one body entry as a column or constraint definition.
fn classify_entry(entry: String) -> DdlEntry {
    if entry.starts_with('`') {
        let name = first_quoted_ident(&entry).unwrap_or_default();
        return DdlEntry::Column {
            name,
            definition: entry,
        };
    }

    let upper = entry.to_uppercase();
    let foreign_key = (upper.starts_with("CONSTRAINT") || upper.starts_with("FOREIGN"))
        && upper.contains("FOREIGN KEY");
    DdlEntry::Constraint {
        definition: entry,
        foreign_key,
    }
}

/// Parse a SHOW CREATE TABLE statement into its structured form.
fn parse_create_table(ddl: &str) -> Result<TableDdl> {
    // Find the body's opening parenthesis, skipping quoted identifiers so a
    // table name containing '(' cannot confuse the scan.
    let mut state = QuoteState::default();
    let mut open = None;
    let mut chars = ddl.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|(_, c)| *c);
        if state.step(c, next) {
            chars.next();
            continue;
        }
        if !state.quoted() && c == '(' {
            open = Some(i);
            break;
        }
    }
    let open = open.context("CREATE TABLE statement has no column list")?;

    let header = &ddl[..open];
    let table = first_quoted_ident(header)
        .context("CREATE TABLE statement has no backtick-quoted table name")?;

    // Walk the body to the matching close parenthesis.
    let mut depth = 0usize;
    let mut state = QuoteState::default();
    let mut close = None;
    let mut chars = ddl[open..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|(_, c)| *c);
        if state.step(c, next) {
            chars.next();
            continue;
        }
        if state.quoted() {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.context("CREATE TABLE statement has an unbalanced column list")?;

    let body = &ddl[open + 1..close];
    let tail = ddl[close + 1..].trim_end().to_string();

    let entries: Vec<DdlEntry> = split_top_level(body)
        .into_iter()
        .map(classify_entry)
        .collect();

    if entries.is_empty() {
        bail!("CREATE TABLE statement for {} defines no columns", table);
    }

    Ok(TableDdl {
        table,
        entries,
        tail,
    })
}

/// Transform a source CREATE TABLE statement into the target's bootstrap DDL.
///
/// Foreign-key constraints are removed, the tracking columns are appended,
/// and the statement is rendered as CREATE TABLE IF NOT EXISTS. Everything
/// else (column types, defaults, indexes, table options) is carried verbatim.
pub fn mirror_table_ddl(ddl: &str) -> Result<String> {
    let mut definition = parse_create_table(ddl)?;
    definition.strip_foreign_keys();
    definition.inject_tracking_columns();
    Ok(definition.render())
}

/// Ensure the target table exists, creating it from the source definition
/// when absent. Returns whether the table was created.
pub async fn ensure_target_table(
    source_conn: &mut Conn,
    target_conn: &mut Conn,
    table: &str,
) -> Result<bool> {
    if introspect::table_exists(target_conn, table).await? {
        tracing::debug!("Target table {} already exists", table);
        return Ok(false);
    }

    let source_ddl = introspect::create_ddl(source_conn, table)
        .await
        .with_context(|| format!("Failed to read source definition for {}", table))?;
    let create = mirror_table_ddl(&source_ddl)
        .with_context(|| format!("Failed to transform source definition for {}", table))?;

    set_foreign_key_checks(target_conn, false).await?;
    let executed = target_conn
        .query_drop(&create)
        .await
        .with_context(|| format!("Failed to create target table {}", table));
    let restored = set_foreign_key_checks(target_conn, true).await;
    executed?;
    restored?;

    tracing::info!("Created target table {} from source definition", table);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS_DDL: &str = "CREATE TABLE `orders` (\n  `id` int NOT NULL AUTO_INCREMENT,\n  `customer_id` int NOT NULL,\n  `total` decimal(10,2) DEFAULT NULL,\n  `status` enum('new','paid','shipped') DEFAULT 'new',\n  PRIMARY KEY (`id`),\n  KEY `idx_customer` (`customer_id`),\n  CONSTRAINT `fk_orders_customer` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

    #[test]
    fn test_split_top_level_respects_parens_and_quotes() {
        let body = "`a` decimal(10,2), `b` enum('x,y','z') DEFAULT 'p,q', KEY `k` (`a`,`b`)";
        let entries = split_top_level(body);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], "`a` decimal(10,2)");
        assert_eq!(entries[1], "`b` enum('x,y','z') DEFAULT 'p,q'");
        assert_eq!(entries[2], "KEY `k` (`a`,`b`)");
    }

    #[test]
    fn test_split_top_level_handles_escaped_quote() {
        let body = "`a` varchar(10) DEFAULT 'it''s, fine', `b` int";
        let entries = split_top_level(body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], "`a` varchar(10) DEFAULT 'it''s, fine'");
    }

    #[test]
    fn test_parse_extracts_table_and_tail() {
        let parsed = parse_create_table(ORDERS_DDL).unwrap();
        assert_eq!(parsed.table, "orders");
        assert_eq!(parsed.entries.len(), 7);
        assert!(parsed.tail.contains("ENGINE=InnoDB"));
    }

    #[test]
    fn test_foreign_key_constraints_are_stripped() {
        let ddl = mirror_table_ddl(ORDERS_DDL).unwrap();
        assert!(!ddl.contains("FOREIGN KEY"));
        assert!(!ddl.contains("fk_orders_customer"));
        // Non-FK constraints and indexes survive
        assert!(ddl.contains("PRIMARY KEY (`id`)"));
        assert!(ddl.contains("KEY `idx_customer` (`customer_id`)"));
    }

    #[test]
    fn test_tracking_columns_are_appended() {
        let ddl = mirror_table_ddl(ORDERS_DDL).unwrap();
        assert!(ddl.contains("`operation_type` VARCHAR(10) DEFAULT 'inserted'"));
        assert!(ddl.contains(
            "`last_updated` TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP"
        ));
    }

    #[test]
    fn test_rendered_statement_is_idempotent() {
        let ddl = mirror_table_ddl(ORDERS_DDL).unwrap();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `orders` ("));
        assert!(ddl.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn test_injection_skipped_when_tracking_column_present() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  `operation_type` varchar(10) DEFAULT 'inserted',\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB";
        let rendered = mirror_table_ddl(ddl).unwrap();
        assert_eq!(rendered.matches("operation_type").count(), 1);
        assert!(!rendered.contains("last_updated"));
    }

    #[test]
    fn test_bare_foreign_key_clause_is_stripped() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  `other` int,\n  PRIMARY KEY (`id`),\n  FOREIGN KEY (`other`) REFERENCES `u` (`id`)\n) ENGINE=InnoDB";
        let rendered = mirror_table_ddl(ddl).unwrap();
        assert!(!rendered.contains("FOREIGN KEY"));
        assert!(rendered.contains("`other` int"));
    }

    #[test]
    fn test_check_constraint_survives() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  `qty` int,\n  PRIMARY KEY (`id`),\n  CONSTRAINT `qty_positive` CHECK ((`qty` > 0))\n) ENGINE=InnoDB";
        let rendered = mirror_table_ddl(ddl).unwrap();
        assert!(rendered.contains("CONSTRAINT `qty_positive` CHECK ((`qty` > 0))"));
    }

    #[test]
    fn test_parse_rejects_statement_without_body() {
        assert!(parse_create_table("CREATE TABLE `t`").is_err());
    }

    #[test]
    fn test_composite_key_table_round_trips() {
        let ddl = "CREATE TABLE `regional` (\n  `region` varchar(8) NOT NULL,\n  `id` int NOT NULL,\n  `name` varchar(64) DEFAULT NULL,\n  PRIMARY KEY (`region`,`id`)\n) ENGINE=InnoDB";
        let rendered = mirror_table_ddl(ddl).unwrap();
        assert!(rendered.contains("PRIMARY KEY (`region`,`id`)"));
        assert!(rendered.contains("`operation_type`"));
    }
}
