use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "text/plain; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "txt",
        }
    }
}

/// Serialize an aggregation result for download. Malformed input degrades to
/// an empty or null textual result; this function never fails.
pub fn format_for_export(data: &Value, format: ExportFormat) -> String {
    match format {
        ExportFormat::Csv => format_as_csv(data),
        ExportFormat::Json => serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".into()),
        // True PDF rendering belongs to an external collaborator; this is
        // the plain-text fallback report.
        ExportFormat::Pdf => {
            let body = serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".into());
            format!("PDF Report\n\nData: {body}")
        }
    }
}

/// Header row comes from the first record's keys, in that record's order.
/// String values are double-quoted; other scalars render raw. Anything that
/// is not a non-empty array yields an empty string.
fn format_as_csv(data: &Value) -> String {
    let Some(rows) = data.as_array() else {
        return String::new();
    };
    let Some(first) = rows.first().and_then(Value::as_object) else {
        return String::new();
    };

    let headers: Vec<&String> = first.keys().collect();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|header| match row.get(header.as_str()) {
                Some(Value::String(s)) => format!("\"{s}\""),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        lines.push(cells.join(","));
    }

    lines.join("\n")
}
