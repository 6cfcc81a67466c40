use climate_core::{TemperatureReport, model::DocumentPage};
use serde_json::Value;

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_temperature(report: &TemperatureReport) {
    let params = &report.metadata.params;
    println!(
        "{} at {} from {} to {} ({} window(s))",
        params.datatypeid, params.location_id, params.startdate, params.enddate, report.metadata.windows,
    );

    if let Some(message) = &report.message {
        println!("{message}");
        return;
    }

    for record in &report.results {
        println!(
            "{}  {:<24} {:>8.1} {}",
            record.date, record.station_id, record.value, record.unit
        );
    }
    println!("{} observation(s)", report.results.len());
}

pub fn print_documents(page: &DocumentPage) {
    let mut shown = 0;

    for (id, doc) in &page.documents {
        // WDS mixes a "facets" entry in with the documents.
        let Some(title) = document_title(doc) else {
            continue;
        };
        let date = doc.get("docdt").and_then(Value::as_str).unwrap_or("-");
        println!("{:<10} {id}  {title}", date.get(..10).unwrap_or(date));
        shown += 1;
    }

    println!("Showing {shown} of {} document(s)", page.total);
}

fn document_title(doc: &Value) -> Option<&str> {
    doc.get("display_title")
        .or_else(|| doc.get("docna").and_then(|d| d.get(0)).and_then(|d| d.get("docna")))
        .and_then(Value::as_str)
}
