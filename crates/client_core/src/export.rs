//! CSV export of reviewed queries.

use std::{fs, path::Path};

use anyhow::Context;
use shared::protocol::Query;
use tracing::info;

const HEADER: [&str; 7] = [
    "id",
    "query",
    "analysis",
    "query type",
    "filter status",
    "manual status",
    "score",
];

/// Quotes a field and doubles any embedded quote.
pub fn escape_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn write_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let line = fields
        .into_iter()
        .map(escape_field)
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

pub fn queries_to_csv(rows: &[Query]) -> String {
    let mut out = String::new();
    write_row(&mut out, HEADER);
    for query in rows {
        let score = query.score.map(|score| score.to_string()).unwrap_or_default();
        write_row(
            &mut out,
            [
                query.id.0.as_str(),
                query.text.as_str(),
                query.analysis.as_deref().unwrap_or_default(),
                query.query_type_code.as_str(),
                query.filter_status.as_str(),
                query.manual_status.as_str(),
                score.as_str(),
            ],
        );
    }
    out
}

/// Writes `rows` to `path`, creating parent directories. Returns the number of
/// data rows written.
pub fn write_csv(path: impl AsRef<Path>, rows: &[Query]) -> anyhow::Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, queries_to_csv(rows))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), rows = rows.len(), "queries exported");
    Ok(rows.len())
}
