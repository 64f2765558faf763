//!
//! # sorparse
//!
//! sorparse decodes Telcordia SR-4731 / Bellcore GR-196 "Standard OTDR
//! Record" files, the binary format optical time-domain reflectometers
//! emit, into a structured record suitable for JSON/CBOR export or a
//! human-readable summary.
//!
//! A SOR file opens with a map block listing every other block by name,
//! revision and size. [`parse_bytes`] decodes the map, locates the known
//! blocks (SupParams, GenParams, FxdParams, KeyEvents, DataPts) and decodes
//! each against its own slice of the file. A failure inside one block does
//! not abort the parse: the record carries an error marker under that
//! block's key and the remaining blocks decode independently. Only an
//! unreadable file or an unusable map is fatal.
//!
pub mod error;
pub mod parser;
#[cfg(feature = "python")]
pub mod python;
pub mod summary;
pub mod types;
pub mod units;

use crate::error::SorError;
use crate::types::{BlockDescriptor, BlockOutcome, SorRecord};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Knobs for a parse. The defaults produce the canonical summary record.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Also extract the raw backscatter samples from the data points
    /// block. Off by default: the samples dwarf everything else in the
    /// record and the summary only needs the counts.
    pub include_trace_samples: bool,
}

/// Reads the file at `path` and parses it as a SOR file.
pub fn parse_file(path: &Path, options: &ParseOptions) -> Result<SorRecord, SorError> {
    let buffer = fs::read(path).map_err(|source| SorError::FileIo {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_bytes(&filename, &buffer, options)
}

/// Parses an in-memory SOR file. `filename` is carried into the record
/// verbatim. The parse is synchronous and touches nothing but the buffer,
/// so calls are independent and re-entrant.
pub fn parse_bytes(
    filename: &str,
    buf: &[u8],
    options: &ParseOptions,
) -> Result<SorRecord, SorError> {
    let map = parser::map_block(buf)?;
    debug!(
        version = map.version,
        blocks = map.blocks.len(),
        "decoded map block"
    );

    const KNOWN_BLOCKS: [&str; 6] = [
        parser::BLOCK_ID_MAP,
        parser::BLOCK_ID_SUPPARAMS,
        parser::BLOCK_ID_GENPARAMS,
        parser::BLOCK_ID_FXDPARAMS,
        parser::BLOCK_ID_KEYEVENTS,
        parser::BLOCK_ID_DATAPTS,
    ];
    for block in &map.blocks {
        if !KNOWN_BLOCKS.contains(&block.name.as_str()) {
            debug!(name = %block.name, size = block.size, "skipping unknown block");
        }
    }

    // First occurrence wins when a name is listed twice
    let descriptor = |name: &str| map.blocks.iter().find(|block| block.name == name);

    let mut record = SorRecord {
        filename: filename.to_string(),
        file_size_bytes: buf.len() as u64,
        blocks_found: map.blocks.iter().map(|block| block.name.clone()).collect(),
        equipment: None,
        general: None,
        acquisition: None,
        key_events: None,
        data_points: None,
    };

    if let Some(desc) = descriptor(parser::BLOCK_ID_SUPPARAMS) {
        record.equipment = Some(decode_block(buf, desc, |slice| {
            parser::supplier_parameters_block(slice)
                .map(|(_, block)| block)
                .map_err(|err| parser::block_failure(&desc.name, err))
        }));
    }
    if let Some(desc) = descriptor(parser::BLOCK_ID_GENPARAMS) {
        record.general = Some(decode_block(buf, desc, |slice| {
            parser::general_parameters_block(slice, desc.version)
                .map(|(_, block)| block)
                .map_err(|err| parser::block_failure(&desc.name, err))
        }));
    }
    if let Some(desc) = descriptor(parser::BLOCK_ID_FXDPARAMS) {
        record.acquisition = Some(decode_block(buf, desc, |slice| {
            parser::fixed_parameters_block(slice, desc.version)
                .map(|(_, block)| block)
                .map_err(|err| parser::block_failure(&desc.name, err))
        }));
    }

    // The one cross-block dependency: key event distances need the group
    // index from the fixed parameters. Absent, failed or non-positive
    // values fall back to the silica default.
    let group_index = match record.acquisition.as_ref().and_then(|slot| slot.decoded()) {
        Some(acquisition) if acquisition.group_index > 0.0 => acquisition.group_index,
        _ => units::DEFAULT_GROUP_INDEX,
    };

    if let Some(desc) = descriptor(parser::BLOCK_ID_KEYEVENTS) {
        record.key_events = Some(decode_block(buf, desc, |slice| {
            parser::key_events_block(slice, desc.version, group_index)
                .map(|(_, block)| block)
                .map_err(|err| parser::block_failure(&desc.name, err))
        }));
    }
    if let Some(desc) = descriptor(parser::BLOCK_ID_DATAPTS) {
        record.data_points = Some(decode_block(buf, desc, |slice| {
            parser::data_points_block(slice, options.include_trace_samples)
                .map(|(_, block)| block)
                .map_err(|err| parser::block_failure(&desc.name, err))
        }));
    }

    Ok(record)
}

/// Cuts the descriptor's slice out of the file and runs the decoder over
/// it. Decoders only ever see their own block, so they cannot read into a
/// neighbour. Every failure, including a slice that lies outside the
/// file, lands in the record as the block's outcome.
fn decode_block<T>(
    buf: &[u8],
    desc: &BlockDescriptor,
    decode: impl FnOnce(&[u8]) -> Result<T, SorError>,
) -> BlockOutcome<T> {
    let start = u64::from(desc.offset);
    let end = start + u64::from(desc.size);
    let outcome = if end > buf.len() as u64 {
        Err(SorError::Truncated {
            block: desc.name.clone(),
            detail: format!(
                "block spans bytes {}..{} but the file holds {}",
                start,
                end,
                buf.len()
            ),
        })
    } else {
        decode(&buf[start as usize..end as usize])
    };
    match outcome {
        Ok(block) => BlockOutcome::Decoded(block),
        Err(err) => {
            let error = err.to_string();
            warn!(block = %desc.name, %error, "block failed to decode");
            BlockOutcome::Failed { error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(buf: &mut Vec<u8>, value: u16) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_u32(buf: &mut Vec<u8>, value: u32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_i16(buf: &mut Vec<u8>, value: i16) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_i32(buf: &mut Vec<u8>, value: i32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_cstr(buf: &mut Vec<u8>, value: &str) {
        buf.extend(value.as_bytes());
        buf.push(0);
    }

    /// Assembles a complete file from content blocks: a map built to
    /// match, then the blocks back to back in the order given.
    fn assemble(version: u16, blocks: &[(&str, u16, Vec<u8>)]) -> Vec<u8> {
        let entries_len: usize = blocks.iter().map(|(name, _, _)| name.len() + 7).sum();
        let header_len = if version < 200 { 8 } else { 6 };
        let nbytes = (header_len + "Map".len() + 7 + entries_len) as u32;

        let mut buf = Vec::new();
        push_u16(&mut buf, version);
        push_u32(&mut buf, nbytes);
        if version < 200 {
            push_u16(&mut buf, blocks.len() as u16 + 1);
        }
        push_cstr(&mut buf, "Map");
        push_u16(&mut buf, version);
        push_u32(&mut buf, nbytes);
        for (name, block_version, content) in blocks {
            push_cstr(&mut buf, name);
            push_u16(&mut buf, *block_version);
            push_u32(&mut buf, content.len() as u32);
        }
        for (_, _, content) in blocks {
            buf.extend_from_slice(content);
        }
        buf
    }

    fn supplier_block() -> Vec<u8> {
        let mut buf = Vec::new();
        for text in [
            "Noyes",
            "OFL280C-100",
            "2G14PT7552",
            "0.0.43",
            "",
            "1.2.04b1011F",
            "Last Calibration Date: 2019-03-25",
        ] {
            push_cstr(&mut buf, text);
        }
        buf
    }

    fn general_block() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(b"EN");
        push_cstr(&mut buf, "C001");
        push_cstr(&mut buf, "009");
        push_u16(&mut buf, 652);
        push_u16(&mut buf, 1550);
        push_cstr(&mut buf, "CAB000");
        push_cstr(&mut buf, "CLS007");
        push_cstr(&mut buf, "");
        buf.extend(b"BC");
        push_i32(&mut buf, 24641);
        push_i32(&mut buf, 503);
        push_cstr(&mut buf, "");
        push_cstr(&mut buf, "");
        buf
    }

    fn fixed_block(group_index_raw: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u32(&mut buf, 1_569_835_674);
        buf.extend(b"mt");
        push_u16(&mut buf, 1550);
        push_i32(&mut buf, -2147);
        push_i32(&mut buf, -42);
        push_u16(&mut buf, 1);
        push_u16(&mut buf, 30);
        push_u32(&mut buf, 100_000);
        push_u32(&mut buf, 30_000);
        push_u32(&mut buf, group_index_raw);
        push_u16(&mut buf, 802);
        push_u32(&mut buf, 2704);
        push_u16(&mut buf, 3000);
        push_u32(&mut buf, 300_000);
        push_i32(&mut buf, 6000);
        push_i32(&mut buf, 2147);
        push_u16(&mut buf, 30342);
        push_u16(&mut buf, 1000);
        push_u16(&mut buf, 0);
        push_u16(&mut buf, 50);
        push_u16(&mut buf, 65000);
        push_u16(&mut buf, 3000);
        buf.extend(b"ST");
        buf
    }

    fn key_events_block_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        push_u16(&mut buf, 1);
        push_u16(&mut buf, 1);
        push_u32(&mut buf, 1_000_000);
        push_i16(&mut buf, 185);
        push_i16(&mut buf, -950);
        push_i32(&mut buf, -23_027);
        buf.extend(b"2F9999LS");
        for _ in 0..5 {
            push_u32(&mut buf, 0);
        }
        push_cstr(&mut buf, "");
        push_u32(&mut buf, 576);
        push_i32(&mut buf, 0);
        push_u32(&mut buf, 182_809);
        push_i32(&mut buf, 37_123);
        push_u16(&mut buf, 24_516);
        buf
    }

    fn data_points_block_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        push_u32(&mut buf, 3);
        push_u16(&mut buf, 1);
        push_u32(&mut buf, 3);
        push_u16(&mut buf, 1000);
        for sample in [500u16, 501, 502] {
            push_u16(&mut buf, sample);
        }
        buf
    }

    fn full_v2_file() -> Vec<u8> {
        assemble(
            200,
            &[
                ("SupParams", 200, supplier_block()),
                ("GenParams", 200, general_block()),
                ("FxdParams", 200, fixed_block(146_850)),
                ("KeyEvents", 200, key_events_block_bytes()),
                ("AcmeParams", 200, vec![0xAA; 12]),
                ("DataPts", 200, data_points_block_bytes()),
            ],
        )
    }

    #[test]
    fn test_minimal_v1_file_is_map_only() {
        let buf = assemble(100, &[]);
        assert_eq!(buf.len(), 18);

        let record = parse_bytes("minimal.sor", &buf, &ParseOptions::default()).unwrap();
        assert_eq!(record.filename, "minimal.sor");
        assert_eq!(record.file_size_bytes, 18);
        assert_eq!(record.blocks_found, vec!["Map".to_string()]);
        assert!(record.equipment.is_none());
        assert!(record.general.is_none());
        assert!(record.acquisition.is_none());
        assert!(record.key_events.is_none());
        assert!(record.data_points.is_none());
    }

    #[test]
    fn test_full_v2_file_decodes_every_block() {
        let buf = full_v2_file();
        let record = parse_bytes("full.sor", &buf, &ParseOptions::default()).unwrap();

        assert_eq!(
            record.blocks_found,
            vec![
                "Map",
                "SupParams",
                "GenParams",
                "FxdParams",
                "KeyEvents",
                "AcmeParams",
                "DataPts"
            ]
        );

        let equipment = record.equipment.as_ref().unwrap().decoded().unwrap();
        assert_eq!(equipment.supplier, "Noyes");
        assert_eq!(equipment.otdr_mainframe_id, "OFL280C-100");

        let general = record.general.as_ref().unwrap().decoded().unwrap();
        assert_eq!(general.fiber_type, 652);
        assert_eq!(general.fiber_type_name, "G.652 (standard SM)");
        assert_eq!(general.build_condition, "BC");
        assert_eq!(general.build_condition_name, "as-built");

        let acquisition = record.acquisition.as_ref().unwrap().decoded().unwrap();
        assert_eq!(acquisition.group_index, 1.4685);
        assert_eq!(
            acquisition.timestamp_utc.as_deref(),
            Some("2019-09-30T09:27:54Z")
        );

        let key_events = record.key_events.as_ref().unwrap().decoded().unwrap();
        assert_eq!(key_events.num_events, 1);
        assert_eq!(key_events.events.len(), 1);
        assert_eq!(
            key_events.events[0].distance_m,
            units::time_to_distance_m(1_000_000, acquisition.group_index)
        );
        assert_eq!(key_events.optical_return_loss_db, Some(24.516));

        let data_points = record.data_points.as_ref().unwrap().decoded().unwrap();
        assert_eq!(data_points.num_data_points, 3);
        assert_eq!(data_points.num_traces, 1);
        assert!(data_points.traces.is_none());

        // A well-formed file accounts for every byte
        let map = parser::map_block(&buf).unwrap();
        let total: u64 = map.blocks.iter().map(|b| u64::from(b.size)).sum();
        assert_eq!(total, record.file_size_bytes);
        for block in &map.blocks {
            assert!(u64::from(block.offset) < record.file_size_bytes);
            assert!(u64::from(block.offset) + u64::from(block.size) <= record.file_size_bytes);
        }
    }

    #[test]
    fn test_trace_samples_are_opt_in() {
        let buf = full_v2_file();
        let options = ParseOptions {
            include_trace_samples: true,
        };
        let record = parse_bytes("full.sor", &buf, &options).unwrap();
        let data_points = record.data_points.as_ref().unwrap().decoded().unwrap();
        let traces = data_points.traces.as_ref().unwrap();
        assert_eq!(traces[0].samples, vec![500, 501, 502]);
    }

    #[test]
    fn test_group_index_of_zero_falls_back_to_default() {
        let buf = assemble(
            200,
            &[
                ("FxdParams", 200, fixed_block(0)),
                ("KeyEvents", 200, key_events_block_bytes()),
            ],
        );
        let record = parse_bytes("zerogi.sor", &buf, &ParseOptions::default()).unwrap();
        let acquisition = record.acquisition.as_ref().unwrap().decoded().unwrap();
        assert_eq!(acquisition.group_index, 0.0);
        let key_events = record.key_events.as_ref().unwrap().decoded().unwrap();
        assert_eq!(
            key_events.events[0].distance_m,
            units::time_to_distance_m(1_000_000, units::DEFAULT_GROUP_INDEX)
        );
        assert!(key_events.events[0].distance_m > 0.0);
    }

    #[test]
    fn test_missing_data_points_block_leaves_slot_unset() {
        let buf = assemble(
            200,
            &[
                ("SupParams", 200, supplier_block()),
                ("GenParams", 200, general_block()),
            ],
        );
        let record = parse_bytes("nodp.sor", &buf, &ParseOptions::default()).unwrap();
        assert!(!record.blocks_found.contains(&"DataPts".to_string()));
        assert!(record.data_points.is_none());
        assert!(record.equipment.is_some());
        assert!(record.general.is_some());
    }

    #[test]
    fn test_truncated_tail_block_fails_alone() {
        let buf = full_v2_file();
        // Chop into the DataPts block: everything before it still decodes
        let record = parse_bytes("cut.sor", &buf[..buf.len() - 5], &ParseOptions::default()).unwrap();
        assert!(record.equipment.as_ref().unwrap().decoded().is_some());
        assert!(record.general.as_ref().unwrap().decoded().is_some());
        assert!(record.acquisition.as_ref().unwrap().decoded().is_some());
        assert!(record.key_events.as_ref().unwrap().decoded().is_some());
        let error = record.data_points.as_ref().unwrap().error().unwrap();
        assert!(error.contains("DataPts"));
    }

    #[test]
    fn test_corrupt_block_is_recovered_locally() {
        // A FxdParams block that is far too short to hold its fields
        let buf = assemble(
            200,
            &[
                ("FxdParams", 200, vec![0x01, 0x02, 0x03]),
                ("KeyEvents", 200, key_events_block_bytes()),
            ],
        );
        let record = parse_bytes("corrupt.sor", &buf, &ParseOptions::default()).unwrap();
        assert!(record.acquisition.as_ref().unwrap().error().is_some());
        // KeyEvents still decodes, with the default group index
        let key_events = record.key_events.as_ref().unwrap().decoded().unwrap();
        assert_eq!(
            key_events.events[0].distance_m,
            units::time_to_distance_m(1_000_000, units::DEFAULT_GROUP_INDEX)
        );
    }

    #[test]
    fn test_duplicate_block_names_first_occurrence_wins() {
        let mut second = general_block();
        // Different fibre type (657) in the duplicate, after the 2-byte
        // language code and the two identifier strings
        second[11] = 0x91;
        second[12] = 0x02;
        let buf = assemble(
            200,
            &[
                ("GenParams", 200, general_block()),
                ("GenParams", 200, second),
            ],
        );
        let record = parse_bytes("dup.sor", &buf, &ParseOptions::default()).unwrap();
        let general = record.general.as_ref().unwrap().decoded().unwrap();
        assert_eq!(general.fiber_type, 652);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let buf = full_v2_file();
        let first = parse_bytes("again.sor", &buf, &ParseOptions::default()).unwrap();
        let second = parse_bytes("again.sor", &buf, &ParseOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_serialises_with_expected_keys() {
        let buf = assemble(
            200,
            &[
                ("GenParams", 200, general_block()),
                ("FxdParams", 200, vec![0xFF]),
            ],
        );
        let record = parse_bytes("keys.sor", &buf, &ParseOptions::default()).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["filename"], "keys.sor");
        assert_eq!(value["general"]["fiber_type_name"], "G.652 (standard SM)");
        // Failed blocks surface as an object with a single error key
        assert!(value["acquisition"]["error"].is_string());
        // Slots for absent blocks are omitted entirely
        assert!(value.get("data_points").is_none());
        // Version-gated fields serialise only when present
        assert!(value["general"].get("user_offset_distance_01m").is_some());
    }

    #[test]
    fn test_parse_file_missing_path_is_file_io() {
        let missing = Path::new("/nonexistent/path/to/trace.sor");
        match parse_file(missing, &ParseOptions::default()) {
            Err(SorError::FileIo { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected FileIo, got {:?}", other),
        }
    }

    #[test]
    fn test_blocks_found_always_has_an_outcome_for_known_blocks() {
        let buf = full_v2_file();
        let record = parse_bytes("all.sor", &buf[..buf.len() - 5], &ParseOptions::default()).unwrap();
        for name in &record.blocks_found {
            let outcome_present = match name.as_str() {
                "SupParams" => record.equipment.is_some(),
                "GenParams" => record.general.is_some(),
                "FxdParams" => record.acquisition.is_some(),
                "KeyEvents" => record.key_events.is_some(),
                "DataPts" => record.data_points.is_some(),
                _ => true, // Map itself and proprietary blocks have no slot
            };
            assert!(outcome_present, "no outcome for {}", name);
        }
    }

    #[test]
    fn test_failed_outcome_accessors() {
        let outcome: BlockOutcome<u8> = BlockOutcome::Failed {
            error: "boom".to_string(),
        };
        assert_eq!(outcome.decoded(), None);
        assert_eq!(outcome.error(), Some("boom"));
    }
}
