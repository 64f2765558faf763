//! Human-readable rendering of a parsed record, for terminal use. Empty
//! fields are left out so a sparse file prints a sparse summary.

use crate::types::{BlockOutcome, SorRecord};
use std::fmt::Write;

/// Renders the record as a text summary.
pub fn render(record: &SorRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== SOR File: {} ({} bytes) ===",
        record.filename, record.file_size_bytes
    );
    let _ = writeln!(out, "Blocks: {}", record.blocks_found.join(", "));

    if let Some(outcome) = &record.equipment {
        section(&mut out, "Equipment");
        match outcome {
            BlockOutcome::Decoded(equipment) => {
                field(&mut out, "Supplier", &equipment.supplier);
                field(&mut out, "OTDR Model", &equipment.otdr_mainframe_id);
                field(&mut out, "OTDR S/N", &equipment.otdr_mainframe_sn);
                field(&mut out, "Module", &equipment.optical_module_id);
                field(&mut out, "Module S/N", &equipment.optical_module_sn);
                field(&mut out, "Software", &equipment.software_revision);
                field(&mut out, "Other", &equipment.other);
            }
            BlockOutcome::Failed { error } => field(&mut out, "Error", error),
        }
    }

    if let Some(outcome) = &record.general {
        section(&mut out, "General Parameters");
        match outcome {
            BlockOutcome::Decoded(general) => {
                field(&mut out, "Cable ID", &general.cable_id);
                field(&mut out, "Fiber ID", &general.fiber_id);
                field(&mut out, "Fiber Type", &general.fiber_type_name);
                field(&mut out, "Wavelength", &format!("{} nm", general.wavelength_nm));
                field(&mut out, "Location A", &general.location_a);
                field(&mut out, "Location B", &general.location_b);
                field(&mut out, "Build Cond.", &general.build_condition_name);
                field(&mut out, "Operator", &general.operator);
                field(&mut out, "Comment", &general.comment);
            }
            BlockOutcome::Failed { error } => field(&mut out, "Error", error),
        }
    }

    if let Some(outcome) = &record.acquisition {
        section(&mut out, "Acquisition Parameters");
        match outcome {
            BlockOutcome::Decoded(acquisition) => {
                if let Some(timestamp) = &acquisition.timestamp_utc {
                    field(&mut out, "Date/Time", timestamp);
                } else {
                    field(
                        &mut out,
                        "Date/Time",
                        &format!("epoch {} (out of range)", acquisition.timestamp_epoch),
                    );
                }
                field(&mut out, "Units", &acquisition.distance_unit);
                field(&mut out, "Wavelength", &format!("{} nm", acquisition.wavelength_nm));
                field(
                    &mut out,
                    "Pulse Width",
                    &join_values(&acquisition.pulse_widths_ns, " ns"),
                );
                field(&mut out, "Group Index", &format!("{}", acquisition.group_index));
                field(
                    &mut out,
                    "Backscatter",
                    &format!("{} dB", acquisition.backscatter_db),
                );
                field(&mut out, "Averages", &format!("{}", acquisition.num_averages));
                field(&mut out, "Range", &format!("{} km", acquisition.range_km));
                field(
                    &mut out,
                    "Data Points",
                    &join_values(&acquisition.num_data_points, ""),
                );
                field(
                    &mut out,
                    "Loss Thresh",
                    &format!("{} dB", acquisition.loss_threshold_db),
                );
                field(
                    &mut out,
                    "Refl Thresh",
                    &format!("{} dB", acquisition.reflectance_threshold_db),
                );
                field(
                    &mut out,
                    "EOF Thresh",
                    &format!("{} dB", acquisition.end_of_fiber_threshold_db),
                );
                if let Some(name) = &acquisition.trace_type_name {
                    field(&mut out, "Trace Type", name);
                }
            }
            BlockOutcome::Failed { error } => field(&mut out, "Error", error),
        }
    }

    if let Some(outcome) = &record.key_events {
        match outcome {
            BlockOutcome::Decoded(key_events) => {
                section(
                    &mut out,
                    &format!("Key Events ({})", key_events.num_events),
                );
                for event in &key_events.events {
                    let _ = writeln!(
                        out,
                        "  #{:>3}  dist={:.3} m  loss={:.3} dB  refl={:.3} dB  [{}] {}",
                        event.event_number,
                        event.distance_m,
                        event.splice_loss_db,
                        event.reflectance_db,
                        event.event_type,
                        event.event_type_description,
                    );
                    if !event.comment.is_empty() {
                        let _ = writeln!(out, "        comment: {}", event.comment);
                    }
                }
                if let Some(total_loss) = key_events.total_loss_db {
                    field(&mut out, "Total Loss", &format!("{} dB", total_loss));
                }
                if let Some(length) = key_events.fiber_length_m {
                    field(&mut out, "Fiber Length", &format!("{} m", length));
                }
                if let Some(orl) = key_events.optical_return_loss_db {
                    field(&mut out, "ORL", &format!("{} dB", orl));
                }
            }
            BlockOutcome::Failed { error } => {
                section(&mut out, "Key Events");
                field(&mut out, "Error", error);
            }
        }
    }

    if let Some(outcome) = &record.data_points {
        section(&mut out, "Trace Data");
        match outcome {
            BlockOutcome::Decoded(data_points) => {
                field(
                    &mut out,
                    "Data Points",
                    &format!("{}", data_points.num_data_points),
                );
                field(&mut out, "Traces", &format!("{}", data_points.num_traces));
                field(&mut out, "Note", &data_points.note);
            }
            BlockOutcome::Failed { error } => field(&mut out, "Error", error),
        }
    }

    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n--- {} ---", title);
}

/// Prints a labelled field, skipping empty values
fn field(out: &mut String, label: &str, value: &str) {
    if !value.is_empty() {
        let _ = writeln!(out, "  {:<13} {}", label, value);
    }
}

fn join_values<T: std::fmt::Display>(values: &[T], unit: &str) -> String {
    values
        .iter()
        .map(|value| format!("{}{}", value, unit))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockOutcome, DataPointsInfo, SorRecord, SupplierParams};

    fn bare_record() -> SorRecord {
        SorRecord {
            filename: "trace.sor".to_string(),
            file_size_bytes: 1234,
            blocks_found: vec!["Map".to_string(), "SupParams".to_string()],
            equipment: None,
            general: None,
            acquisition: None,
            key_events: None,
            data_points: None,
        }
    }

    #[test]
    fn test_render_header_and_blocks() {
        let rendered = render(&bare_record());
        assert!(rendered.contains("=== SOR File: trace.sor (1234 bytes) ==="));
        assert!(rendered.contains("Blocks: Map, SupParams"));
        assert!(!rendered.contains("--- Equipment ---"));
    }

    #[test]
    fn test_render_decoded_equipment_skips_empty_fields() {
        let mut record = bare_record();
        record.equipment = Some(BlockOutcome::Decoded(SupplierParams {
            supplier: "Noyes".to_string(),
            otdr_mainframe_id: "OFL280C-100".to_string(),
            otdr_mainframe_sn: "".to_string(),
            optical_module_id: "".to_string(),
            optical_module_sn: "".to_string(),
            software_revision: "".to_string(),
            other: "".to_string(),
        }));
        let rendered = render(&record);
        assert!(rendered.contains("--- Equipment ---"));
        assert!(rendered.contains("Supplier"));
        assert!(rendered.contains("Noyes"));
        assert!(!rendered.contains("OTDR S/N"));
    }

    #[test]
    fn test_render_failed_block_shows_error() {
        let mut record = bare_record();
        record.data_points = Some(BlockOutcome::Failed {
            error: "DataPts is truncated".to_string(),
        });
        let rendered = render(&record);
        assert!(rendered.contains("--- Trace Data ---"));
        assert!(rendered.contains("DataPts is truncated"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut record = bare_record();
        record.data_points = Some(BlockOutcome::Decoded(DataPointsInfo {
            num_data_points: 30_000,
            num_traces: 1,
            note: "raw trace samples skipped".to_string(),
            traces: None,
        }));
        assert_eq!(render(&record), render(&record));
    }
}
