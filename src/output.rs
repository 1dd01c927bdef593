use std::fmt::Write;

use passlock::CredentialRecord;

const SHORT_ID_LEN: usize = 8;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn short_id(record: &CredentialRecord) -> String {
    let id = record.id().simple().to_string();
    id[..SHORT_ID_LEN].to_string()
}

/// Aligned `ID  Title  Username  Modified` table.
pub fn record_table(records: &[&CredentialRecord]) -> String {
    if records.is_empty() {
        return "No credentials stored.\n".to_string();
    }

    let rows: Vec<[String; 4]> = records
        .iter()
        .map(|r| {
            [
                short_id(r),
                r.title().to_string(),
                r.username().to_string(),
                r.modified_at().format(TIME_FORMAT).to_string(),
            ]
        })
        .collect();

    let header = ["ID", "Title", "Username", "Modified"];
    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header[col].len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<w0$}  {:<w1$}  {:<w2$}  {}",
        header[0],
        header[1],
        header[2],
        header[3],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    );
    let _ = writeln!(
        out,
        "{:-<w0$}  {:-<w1$}  {:-<w2$}  {:-<w3$}",
        "",
        "",
        "",
        "",
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<w0$}  {:<w1$}  {:<w2$}  {}",
            row[0],
            row[1],
            row[2],
            row[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        );
    }
    out
}

/// One record, field per line. The password is masked unless `reveal`.
pub fn record_details(record: &CredentialRecord, reveal: bool) -> String {
    let password = if reveal {
        record.password().to_string()
    } else {
        "********".to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "id:        {}", record.id());
    let _ = writeln!(out, "title:     {}", record.title());
    let _ = writeln!(out, "username:  {}", record.username());
    let _ = writeln!(out, "password:  {password}");
    if let Some(url) = record.url() {
        let _ = writeln!(out, "url:       {url}");
    }
    if let Some(notes) = record.notes() {
        let _ = writeln!(out, "notes:     {notes}");
    }
    let created = record.created_at().format(TIME_FORMAT);
    let modified = record.modified_at().format(TIME_FORMAT);
    let _ = writeln!(out, "created:   {created}");
    let _ = writeln!(out, "modified:  {modified}");
    out
}
