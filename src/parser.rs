use crate::error::SorError;
use crate::types::{
    AcquisitionParams, BlockDescriptor, DataPointsInfo, GeneralParams, KeyEvent, KeyEventsBlock,
    MapBlock, SupplierParams, TraceData,
};
use crate::units::{
    build_condition_name, describe_event_type, epoch_to_utc, fiber_type_name, time_to_distance_m,
    trace_type_name,
};
use nom::{
    bytes::complete::take,
    error::ErrorKind,
    multi::count,
    number::complete::{le_i16, le_i32, le_u16, le_u32},
    IResult, Parser,
};

/// Block name for the map block
pub const BLOCK_ID_MAP: &str = "Map";
/// Block name for the supplier parameters block
pub const BLOCK_ID_SUPPARAMS: &str = "SupParams";
/// Block name for the general parameters block
pub const BLOCK_ID_GENPARAMS: &str = "GenParams";
/// Block name for the fixed parameters block
pub const BLOCK_ID_FXDPARAMS: &str = "FxdParams";
/// Block name for the key events block
pub const BLOCK_ID_KEYEVENTS: &str = "KeyEvents";
/// Block name for the data points block
pub const BLOCK_ID_DATAPTS: &str = "DataPts";

/// Revisions at or above this value use the version-2 field layouts
pub const V2_REVISION: u16 = 200;

/// Decodes a slice of raw bytes as latin-1, one byte per code point. SOR
/// strings are not UTF-8; decoding them as such rejects valid files.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse a NUL-terminated latin-1 string, consuming the terminator. A
/// string with no terminator before the end of the input runs to the end;
/// empty strings are fine.
fn null_terminated_latin1(i: &[u8]) -> IResult<&[u8], String> {
    match i.iter().position(|&b| b == 0) {
        Some(n) => Ok((&i[n + 1..], latin1(&i[..n]))),
        None => Ok((&i[i.len()..], latin1(i))),
    }
}

/// Parse a fixed-length latin-1 string of the given number of bytes
fn fixed_latin1(i: &[u8], n_bytes: usize) -> IResult<&[u8], String> {
    let (i, bytes) = take(n_bytes)(i)?;
    Ok((i, latin1(bytes)))
}

/// Parse an i32 that only exists in version-2 layouts
fn v2_only_i32(i: &[u8], v2: bool) -> IResult<&[u8], Option<i32>> {
    if v2 {
        let (i, value) = le_i32(i)?;
        Ok((i, Some(value)))
    } else {
        Ok((i, None))
    }
}

/// Parse one directory entry within the map block
fn map_entry(i: &[u8]) -> IResult<&[u8], (String, u16, u32)> {
    let (i, name) = null_terminated_latin1(i)?;
    let (i, version) = le_u16(i)?;
    let (i, size) = le_u32(i)?;
    Ok((i, (name, version, size)))
}

/// Parse the fixed lead-in of the map block. Version-1 files declare a
/// block count here; it is kept for the record but never trusted, since
/// entry reading terminates on the declared byte count for both versions.
fn map_header(i: &[u8]) -> IResult<&[u8], (u16, u32, Option<u16>)> {
    let (i, version) = le_u16(i)?;
    let (i, nbytes) = le_u32(i)?;
    if version < V2_REVISION {
        let (i, declared) = le_u16(i)?;
        Ok((i, (version, nbytes, Some(declared))))
    } else {
        Ok((i, (version, nbytes, None)))
    }
}

/// Parses the map block at the start of a SOR file and derives the
/// absolute offset of every block as the running sum of the sizes listed,
/// the map's own entry first at offset zero. Anything wrong here is fatal:
/// without a usable map no other block can be located.
pub fn map_block(buf: &[u8]) -> Result<MapBlock, SorError> {
    let (mut i, (version, nbytes, declared_block_count)) = map_header(buf)
        .map_err(|_| SorError::MalformedMap("the map header does not fit in the file".into()))?;
    let map_end = nbytes as usize;
    if map_end > buf.len() {
        return Err(SorError::MalformedMap(format!(
            "map declares {} bytes but the file holds {}",
            nbytes,
            buf.len()
        )));
    }
    let header_len = buf.len() - i.len();
    if map_end < header_len {
        return Err(SorError::MalformedMap(format!(
            "map declares {} bytes, less than its own {}-byte header",
            nbytes, header_len
        )));
    }

    let mut blocks = Vec::new();
    let mut next_offset: u64 = 0;
    while buf.len() - i.len() < map_end {
        let (rest, (name, entry_version, size)) = map_entry(i).map_err(|_| {
            SorError::MalformedMap(format!("directory entry {} is truncated", blocks.len()))
        })?;
        if buf.len() - rest.len() > map_end {
            return Err(SorError::MalformedMap(format!(
                "directory entry {} crosses the declared end of the map",
                blocks.len()
            )));
        }
        if next_offset > u64::from(u32::MAX) {
            return Err(SorError::MalformedMap(
                "block offsets exceed the 32-bit range".into(),
            ));
        }
        blocks.push(BlockDescriptor {
            name,
            version: entry_version,
            size,
            offset: next_offset as u32,
        });
        next_offset += u64::from(size);
        i = rest;
    }

    Ok(MapBlock {
        version,
        nbytes,
        declared_block_count,
        blocks,
    })
}

/// Parse the supplier parameters block: seven free-text strings
/// describing the OTDR unit.
pub fn supplier_parameters_block(i: &[u8]) -> IResult<&[u8], SupplierParams> {
    let (i, supplier) = null_terminated_latin1(i)?;
    let (i, otdr_mainframe_id) = null_terminated_latin1(i)?;
    let (i, otdr_mainframe_sn) = null_terminated_latin1(i)?;
    let (i, optical_module_id) = null_terminated_latin1(i)?;
    let (i, optical_module_sn) = null_terminated_latin1(i)?;
    let (i, software_revision) = null_terminated_latin1(i)?;
    let (i, other) = null_terminated_latin1(i)?;
    Ok((
        i,
        SupplierParams {
            supplier,
            otdr_mainframe_id,
            otdr_mainframe_sn,
            optical_module_id,
            optical_module_sn,
            software_revision,
            other,
        },
    ))
}

/// Parse the general parameters block, which identifies the cable and
/// fibre under test. The user offset distance only exists in version-2
/// layouts.
pub fn general_parameters_block(i: &[u8], version: u16) -> IResult<&[u8], GeneralParams> {
    let v2 = version >= V2_REVISION;
    let (i, language_code) = fixed_latin1(i, 2)?;
    let (i, cable_id) = null_terminated_latin1(i)?;
    let (i, fiber_id) = null_terminated_latin1(i)?;
    let (i, fiber_type) = le_u16(i)?;
    let (i, wavelength_nm) = le_u16(i)?;
    let (i, location_a) = null_terminated_latin1(i)?;
    let (i, location_b) = null_terminated_latin1(i)?;
    let (i, cable_code) = null_terminated_latin1(i)?;
    let (i, build_condition) = fixed_latin1(i, 2)?;
    let (i, user_offset_100ps) = le_i32(i)?;
    let (i, user_offset_distance_01m) = v2_only_i32(i, v2)?;
    let (i, operator) = null_terminated_latin1(i)?;
    let (i, comment) = null_terminated_latin1(i)?;
    let fiber_name = fiber_type_name(fiber_type);
    let condition_name = build_condition_name(&build_condition);
    Ok((
        i,
        GeneralParams {
            language_code,
            cable_id,
            fiber_id,
            fiber_type,
            fiber_type_name: fiber_name,
            wavelength_nm,
            location_a,
            location_b,
            cable_code,
            build_condition,
            build_condition_name: condition_name,
            user_offset_100ps,
            user_offset_distance_01m,
            operator,
            comment,
        },
    ))
}

/// Parse the fixed parameters block, which carries the acquisition
/// settings and most of what is needed to interpret the stored trace.
/// Three arrays run back to back, one entry per pulse width. The trailing
/// trace type is version 2 only and some instruments omit it even then,
/// so it is read only when the block has room left.
pub fn fixed_parameters_block(i: &[u8], version: u16) -> IResult<&[u8], AcquisitionParams> {
    let v2 = version >= V2_REVISION;
    let (i, timestamp_epoch) = le_u32(i)?;
    let (i, distance_unit) = fixed_latin1(i, 2)?;
    let (i, wavelength_nm) = le_u16(i)?;
    let (i, acquisition_offset_100ps) = le_i32(i)?;
    let (i, acquisition_offset_distance_01m) = v2_only_i32(i, v2)?;
    let (i, num_pulse_widths) = le_u16(i)?;
    let pulse_width_count = num_pulse_widths as usize;
    let (i, pulse_widths_ns) = count(le_u16, pulse_width_count).parse(i)?;
    let (i, data_spacing_100ps) = count(le_u32, pulse_width_count).parse(i)?;
    let (i, num_data_points) = count(le_u32, pulse_width_count).parse(i)?;
    let (i, group_index_raw) = le_u32(i)?;
    let (i, backscatter_raw) = le_u16(i)?;
    let (i, num_averages) = le_u32(i)?;
    let (i, averaging_time_s) = le_u16(i)?;
    let (i, range_100ps) = le_u32(i)?;
    let (i, acquisition_range_distance_01m) = v2_only_i32(i, v2)?;
    let (i, front_panel_offset_100ps) = le_i32(i)?;
    let (i, noise_floor_level) = le_u16(i)?;
    let (i, noise_floor_scale_factor) = le_u16(i)?;
    let (i, power_offset_first_point) = le_u16(i)?;
    let (i, loss_threshold_raw) = le_u16(i)?;
    let (i, reflectance_threshold_raw) = le_u16(i)?;
    let (i, eof_threshold_raw) = le_u16(i)?;
    let (i, trace_type) = if v2 && i.len() >= 2 {
        let (i, code) = fixed_latin1(i, 2)?;
        (i, Some(code))
    } else {
        (i, None)
    };
    Ok((
        i,
        AcquisitionParams {
            timestamp_epoch,
            timestamp_utc: epoch_to_utc(timestamp_epoch),
            distance_unit,
            wavelength_nm,
            acquisition_offset_100ps,
            acquisition_offset_distance_01m,
            num_pulse_widths,
            pulse_widths_ns,
            data_spacing_100ps,
            num_data_points,
            group_index: f64::from(group_index_raw) / 100_000.0,
            backscatter_db: -f64::from(backscatter_raw) / 10.0,
            num_averages,
            averaging_time_s,
            range_100ps,
            range_km: f64::from(range_100ps) * 1e-6,
            acquisition_range_distance_01m,
            front_panel_offset_100ps,
            noise_floor_level,
            noise_floor_scale_factor,
            power_offset_first_point,
            loss_threshold_db: f64::from(loss_threshold_raw) / 1000.0,
            reflectance_threshold_db: -f64::from(reflectance_threshold_raw) / 1000.0,
            end_of_fiber_threshold_db: f64::from(eof_threshold_raw) / 1000.0,
            trace_type_name: trace_type.as_deref().map(trace_type_name),
            trace_type,
        },
    ))
}

/// Parse a single key event. The five neighbourhood offsets only exist in
/// version-2 layouts. Distances are derived with the group index in force
/// for this parse.
fn key_event(i: &[u8], v2: bool, group_index: f64) -> IResult<&[u8], KeyEvent> {
    let (i, event_number) = le_u16(i)?;
    let (i, time_of_travel_100ps) = le_u32(i)?;
    let (i, slope_raw) = le_i16(i)?;
    let (i, splice_loss_raw) = le_i16(i)?;
    let (i, reflectance_raw) = le_i32(i)?;
    let (i, event_type) = fixed_latin1(i, 8)?;
    let (i, neighbourhood) = if v2 {
        let (i, offsets) = count(le_u32, 5).parse(i)?;
        (i, Some(offsets))
    } else {
        (i, None)
    };
    let (i, comment) = null_terminated_latin1(i)?;
    let at = |n: usize| neighbourhood.as_ref().map(|offsets| offsets[n]);
    Ok((
        i,
        KeyEvent {
            event_number,
            time_of_travel_100ps,
            distance_m: time_to_distance_m(time_of_travel_100ps, group_index),
            slope_db_km: f64::from(slope_raw) / 1000.0,
            splice_loss_db: f64::from(splice_loss_raw) / 1000.0,
            reflectance_db: f64::from(reflectance_raw) / 1000.0,
            event_type_description: describe_event_type(&event_type),
            event_type,
            end_of_previous_event: at(0),
            start_of_current_event: at(1),
            end_of_current_event: at(2),
            start_of_next_event: at(3),
            peak_of_current_event: at(4),
            comment,
        },
    ))
}

/// Parse the key events block: the declared number of events followed by
/// the end-to-end summary. The summary is best-effort; each field is read
/// only while the block has bytes left for it, and a short tail is not an
/// error.
pub fn key_events_block(
    i: &[u8],
    version: u16,
    group_index: f64,
) -> IResult<&[u8], KeyEventsBlock> {
    let v2 = version >= V2_REVISION;
    let (i, num_events) = le_u16(i)?;
    let (i, events) = count(
        |input| key_event(input, v2, group_index),
        num_events as usize,
    )
    .parse(i)?;

    let mut block = KeyEventsBlock {
        num_events,
        events,
        total_loss_db: None,
        fiber_start_position: None,
        fiber_length_100ps: None,
        fiber_length_m: None,
        fiber_length_01m: None,
        optical_return_loss_db: None,
    };

    let mut i = i;
    if i.len() < 4 {
        return Ok((i, block));
    }
    let (rest, total_loss_raw) = le_u32(i)?;
    block.total_loss_db = Some(f64::from(total_loss_raw) / 1000.0);
    i = rest;
    if i.len() < 4 {
        return Ok((i, block));
    }
    let (rest, start_position) = le_i32(i)?;
    block.fiber_start_position = Some(start_position);
    i = rest;
    if i.len() < 4 {
        return Ok((i, block));
    }
    let (rest, length_100ps) = le_u32(i)?;
    block.fiber_length_100ps = Some(length_100ps);
    block.fiber_length_m = Some(time_to_distance_m(length_100ps, group_index));
    i = rest;
    if v2 {
        if i.len() < 4 {
            return Ok((i, block));
        }
        let (rest, length_01m) = le_i32(i)?;
        block.fiber_length_01m = Some(length_01m);
        i = rest;
    }
    if i.len() < 2 {
        return Ok((i, block));
    }
    let (rest, orl_raw) = le_u16(i)?;
    block.optical_return_loss_db = Some(f64::from(orl_raw) / 1000.0);
    Ok((rest, block))
}

/// Parse one trace section within the data points block
fn trace_section(i: &[u8]) -> IResult<&[u8], TraceData> {
    let (i, num_points) = le_u32(i)?;
    let (i, scale_factor) = le_u16(i)?;
    let (i, samples) = count(le_u16, num_points as usize).parse(i)?;
    Ok((
        i,
        TraceData {
            num_points,
            scale_factor,
            samples,
        },
    ))
}

/// Parse the data points block. The canonical record keeps the counts
/// only; the sample arrays are read when extraction was requested and
/// skipped otherwise.
pub fn data_points_block(i: &[u8], include_samples: bool) -> IResult<&[u8], DataPointsInfo> {
    let (i, num_data_points) = le_u32(i)?;
    let (i, num_traces) = le_u16(i)?;
    let (i, traces, note) = if include_samples {
        let (i, traces) = count(trace_section, num_traces as usize).parse(i)?;
        (i, Some(traces), "raw trace samples included".to_string())
    } else {
        (
            i,
            None,
            "raw trace samples skipped; request sample extraction to include them".to_string(),
        )
    };
    Ok((
        i,
        DataPointsInfo {
            num_data_points,
            num_traces,
            note,
            traces,
        },
    ))
}

/// Turns a nom failure inside a block into the matching error kind:
/// running out of bytes is a truncation, anything else a plain decode
/// failure.
pub(crate) fn block_failure(block: &str, err: nom::Err<nom::error::Error<&[u8]>>) -> SorError {
    match err {
        nom::Err::Incomplete(_) => SorError::Truncated {
            block: block.to_string(),
            detail: "more data required".to_string(),
        },
        nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
            ErrorKind::Eof | ErrorKind::Complete => SorError::Truncated {
                block: block.to_string(),
                detail: format!("a read ran past the end of the block ({} bytes left)", e.input.len()),
            },
            code => SorError::BlockDecode {
                block: block.to_string(),
                detail: format!("{:?} failed with {} bytes left", code, e.input.len()),
            },
        },
    }
}

#[cfg(test)]
fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
fn push_i16(buf: &mut Vec<u8>, value: i16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
fn push_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
fn push_cstr(buf: &mut Vec<u8>, value: &str) {
    buf.extend(value.as_bytes());
    buf.push(0);
}

#[test]
fn test_null_terminated_latin1() {
    let (rest, parsed) = null_terminated_latin1(b"abcdef\0xyz").unwrap();
    assert_eq!(parsed, "abcdef");
    assert_eq!(rest, b"xyz");
}

#[test]
fn test_null_terminated_latin1_empty() {
    let (rest, parsed) = null_terminated_latin1(b"\0after").unwrap();
    assert_eq!(parsed, "");
    assert_eq!(rest, b"after");
}

#[test]
fn test_null_terminated_latin1_non_ascii() {
    // 0xE9 is é in latin-1 but an invalid UTF-8 sequence
    let (_, parsed) = null_terminated_latin1(&[0x63, 0x61, 0x66, 0xE9, 0x00]).unwrap();
    assert_eq!(parsed, "café");
}

#[test]
fn test_null_terminated_latin1_unterminated_runs_to_end() {
    let (rest, parsed) = null_terminated_latin1(b"no terminator").unwrap();
    assert_eq!(parsed, "no terminator");
    assert!(rest.is_empty());
}

#[test]
fn test_map_block_v1_minimal() {
    let mut buf = Vec::new();
    push_u16(&mut buf, 100);
    push_u32(&mut buf, 18);
    push_u16(&mut buf, 1);
    push_cstr(&mut buf, "Map");
    push_u16(&mut buf, 100);
    push_u32(&mut buf, 18);
    assert_eq!(buf.len(), 18);

    let map = map_block(&buf).unwrap();
    assert_eq!(map.version, 100);
    assert_eq!(map.nbytes, 18);
    assert_eq!(map.declared_block_count, Some(1));
    assert_eq!(
        map.blocks,
        vec![BlockDescriptor {
            name: "Map".to_string(),
            version: 100,
            size: 18,
            offset: 0,
        }]
    );
}

#[test]
fn test_map_block_offsets_are_prefix_sums() {
    let mut buf = Vec::new();
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 46);
    push_cstr(&mut buf, "Map");
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 46);
    push_cstr(&mut buf, "GenParams");
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 60);
    push_cstr(&mut buf, "DataPts");
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 7);
    assert_eq!(buf.len(), 46);
    buf.resize(46 + 60 + 7, 0);

    let map = map_block(&buf).unwrap();
    assert_eq!(map.declared_block_count, None);
    let offsets: Vec<u32> = map.blocks.iter().map(|b| b.offset).collect();
    assert_eq!(offsets, vec![0, 46, 106]);
    assert_eq!(map.blocks[1].name, "GenParams");
    // The advisory-free v2 header still terminates on the byte count
    assert_eq!(map.blocks.len(), 3);
}

#[test]
fn test_map_block_ignores_bogus_declared_count() {
    // A v1 map whose declared count disagrees with the entries present;
    // termination is by byte count so the lie is recorded, not trusted
    let mut buf = Vec::new();
    push_u16(&mut buf, 100);
    push_u32(&mut buf, 18);
    push_u16(&mut buf, 40);
    push_cstr(&mut buf, "Map");
    push_u16(&mut buf, 100);
    push_u32(&mut buf, 18);

    let map = map_block(&buf).unwrap();
    assert_eq!(map.declared_block_count, Some(40));
    assert_eq!(map.blocks.len(), 1);
}

#[test]
fn test_map_block_nbytes_beyond_buffer() {
    let mut buf = Vec::new();
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 500);
    match map_block(&buf) {
        Err(SorError::MalformedMap(_)) => {}
        other => panic!("expected MalformedMap, got {:?}", other),
    }
}

#[test]
fn test_map_block_entry_crossing_declared_end() {
    let mut buf = Vec::new();
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 12); // room for the header plus six stray bytes
    push_cstr(&mut buf, "Map");
    push_u16(&mut buf, 200);
    push_u32(&mut buf, 12);
    match map_block(&buf) {
        Err(SorError::MalformedMap(_)) => {}
        other => panic!("expected MalformedMap, got {:?}", other),
    }
}

#[test]
fn test_map_block_truncated_header() {
    match map_block(&[0x01]) {
        Err(SorError::MalformedMap(_)) => {}
        other => panic!("expected MalformedMap, got {:?}", other),
    }
}

#[test]
fn test_supplier_parameters_block() {
    let mut buf = Vec::new();
    push_cstr(&mut buf, "Noyes");
    push_cstr(&mut buf, "OFL280C-100");
    push_cstr(&mut buf, "2G14PT7552");
    push_cstr(&mut buf, "0.0.43");
    push_cstr(&mut buf, "");
    push_cstr(&mut buf, "1.2.04b1011F");
    push_cstr(&mut buf, "Last Calibration Date: 2019-03-25");

    let (rest, parsed) = supplier_parameters_block(&buf).unwrap();
    assert!(rest.is_empty());
    assert_eq!(
        parsed,
        SupplierParams {
            supplier: "Noyes".to_string(),
            otdr_mainframe_id: "OFL280C-100".to_string(),
            otdr_mainframe_sn: "2G14PT7552".to_string(),
            optical_module_id: "0.0.43".to_string(),
            optical_module_sn: "".to_string(),
            software_revision: "1.2.04b1011F".to_string(),
            other: "Last Calibration Date: 2019-03-25".to_string(),
        }
    );
}

#[cfg(test)]
fn sample_general_params(v2: bool) -> Vec<u8> {
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
    if v2 {
        push_i32(&mut buf, 503);
    }
    push_cstr(&mut buf, "");
    push_cstr(&mut buf, "annual sweep");
    buf
}

#[test]
fn test_general_parameters_block_v2() {
    let buf = sample_general_params(true);
    let (_, parsed) = general_parameters_block(&buf, 200).unwrap();
    assert_eq!(parsed.language_code, "EN");
    assert_eq!(parsed.cable_id, "C001");
    assert_eq!(parsed.fiber_id, "009");
    assert_eq!(parsed.fiber_type, 652);
    assert_eq!(parsed.fiber_type_name, "G.652 (standard SM)");
    assert_eq!(parsed.wavelength_nm, 1550);
    assert_eq!(parsed.location_a, "CAB000");
    assert_eq!(parsed.location_b, "CLS007");
    assert_eq!(parsed.cable_code, "");
    assert_eq!(parsed.build_condition, "BC");
    assert_eq!(parsed.build_condition_name, "as-built");
    assert_eq!(parsed.user_offset_100ps, 24641);
    assert_eq!(parsed.user_offset_distance_01m, Some(503));
    assert_eq!(parsed.operator, "");
    assert_eq!(parsed.comment, "annual sweep");
}

#[test]
fn test_general_parameters_block_v1_has_no_offset_distance() {
    let buf = sample_general_params(false);
    let (_, parsed) = general_parameters_block(&buf, 100).unwrap();
    assert_eq!(parsed.user_offset_distance_01m, None);
    assert_eq!(parsed.comment, "annual sweep");
}

#[test]
fn test_general_parameters_unknown_codes_pass_through() {
    let mut buf = Vec::new();
    buf.extend(b"EN");
    push_cstr(&mut buf, "");
    push_cstr(&mut buf, "");
    push_u16(&mut buf, 999);
    push_u16(&mut buf, 1310);
    push_cstr(&mut buf, "");
    push_cstr(&mut buf, "");
    push_cstr(&mut buf, "");
    buf.extend(b"ZZ");
    push_i32(&mut buf, 0);
    push_i32(&mut buf, 0);
    push_cstr(&mut buf, "");
    push_cstr(&mut buf, "");
    let (_, parsed) = general_parameters_block(&buf, 200).unwrap();
    assert_eq!(parsed.fiber_type_name, "999");
    assert_eq!(parsed.build_condition_name, "ZZ");
}

#[cfg(test)]
fn sample_fixed_params(v2: bool, group_index_raw: u32, with_trace_type: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    push_u32(&mut buf, 1_569_835_674);
    buf.extend(b"mt");
    push_u16(&mut buf, 1550);
    push_i32(&mut buf, -2147);
    if v2 {
        push_i32(&mut buf, -42);
    }
    push_u16(&mut buf, 1);
    push_u16(&mut buf, 30);
    push_u32(&mut buf, 100_000);
    push_u32(&mut buf, 30_000);
    push_u32(&mut buf, group_index_raw);
    push_u16(&mut buf, 802);
    push_u32(&mut buf, 2704);
    push_u16(&mut buf, 3000);
    push_u32(&mut buf, 300_000);
    if v2 {
        push_i32(&mut buf, 6000);
    }
    push_i32(&mut buf, 2147);
    push_u16(&mut buf, 30342);
    push_u16(&mut buf, 1000);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 50);
    push_u16(&mut buf, 65000);
    push_u16(&mut buf, 3000);
    if with_trace_type {
        buf.extend(b"ST");
    }
    buf
}

#[test]
fn test_fixed_parameters_block_v2() {
    let buf = sample_fixed_params(true, 146_850, true);
    let (_, parsed) = fixed_parameters_block(&buf, 200).unwrap();
    assert_eq!(parsed.timestamp_epoch, 1_569_835_674);
    assert_eq!(parsed.timestamp_utc.as_deref(), Some("2019-09-30T09:27:54Z"));
    assert_eq!(parsed.distance_unit, "mt");
    assert_eq!(parsed.wavelength_nm, 1550);
    assert_eq!(parsed.acquisition_offset_100ps, -2147);
    assert_eq!(parsed.acquisition_offset_distance_01m, Some(-42));
    assert_eq!(parsed.num_pulse_widths, 1);
    assert_eq!(parsed.pulse_widths_ns, vec![30]);
    assert_eq!(parsed.data_spacing_100ps, vec![100_000]);
    assert_eq!(parsed.num_data_points, vec![30_000]);
    assert_eq!(parsed.group_index, 1.4685);
    assert_eq!(parsed.backscatter_db, -80.2);
    assert_eq!(parsed.num_averages, 2704);
    assert_eq!(parsed.averaging_time_s, 3000);
    assert_eq!(parsed.range_100ps, 300_000);
    assert_eq!(parsed.range_km, 0.3);
    assert_eq!(parsed.acquisition_range_distance_01m, Some(6000));
    assert_eq!(parsed.front_panel_offset_100ps, 2147);
    assert_eq!(parsed.noise_floor_level, 30342);
    assert_eq!(parsed.noise_floor_scale_factor, 1000);
    assert_eq!(parsed.power_offset_first_point, 0);
    assert_eq!(parsed.loss_threshold_db, 0.05);
    assert_eq!(parsed.reflectance_threshold_db, -65.0);
    assert_eq!(parsed.end_of_fiber_threshold_db, 3.0);
    assert_eq!(parsed.trace_type.as_deref(), Some("ST"));
    assert_eq!(parsed.trace_type_name.as_deref(), Some("standard"));
}

#[test]
fn test_fixed_parameters_array_lengths_follow_count() {
    let mut buf = Vec::new();
    push_u32(&mut buf, 0);
    buf.extend(b"mt");
    push_u16(&mut buf, 1310);
    push_i32(&mut buf, 0);
    push_i32(&mut buf, 0);
    push_u16(&mut buf, 3);
    for w in [10u16, 30, 100] {
        push_u16(&mut buf, w);
    }
    for s in [50_000u32, 100_000, 200_000] {
        push_u32(&mut buf, s);
    }
    for n in [16_000u32, 32_000, 64_000] {
        push_u32(&mut buf, n);
    }
    push_u32(&mut buf, 146_850);
    push_u16(&mut buf, 790);
    push_u32(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 0);
    push_i32(&mut buf, 0);
    push_i32(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);

    let (_, parsed) = fixed_parameters_block(&buf, 200).unwrap();
    assert_eq!(parsed.pulse_widths_ns.len(), 3);
    assert_eq!(parsed.data_spacing_100ps.len(), 3);
    assert_eq!(parsed.num_data_points.len(), 3);
    assert_eq!(parsed.pulse_widths_ns, vec![10, 30, 100]);
    // No room for a trace type, so none is read
    assert_eq!(parsed.trace_type, None);
}

#[test]
fn test_fixed_parameters_v1_never_reads_trace_type() {
    // Two spare bytes at the end of a v1 block stay unread
    let mut buf = sample_fixed_params(false, 146_850, false);
    buf.extend(b"ST");
    let (_, parsed) = fixed_parameters_block(&buf, 100).unwrap();
    assert_eq!(parsed.acquisition_offset_distance_01m, None);
    assert_eq!(parsed.acquisition_range_distance_01m, None);
    assert_eq!(parsed.trace_type, None);
    assert_eq!(parsed.trace_type_name, None);
}

#[test]
fn test_fixed_parameters_truncated() {
    let buf = sample_fixed_params(true, 146_850, true);
    let err = fixed_parameters_block(&buf[..20], 200).unwrap_err();
    match block_failure(BLOCK_ID_FXDPARAMS, err) {
        SorError::Truncated { block, .. } => assert_eq!(block, BLOCK_ID_FXDPARAMS),
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[cfg(test)]
fn sample_key_events(v2: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    push_u16(&mut buf, 2);
    push_u16(&mut buf, 1);
    push_u32(&mut buf, 0);
    push_i16(&mut buf, 0);
    push_i16(&mut buf, -215);
    push_i32(&mut buf, -46_671);
    buf.extend(b"1F9999LS");
    if v2 {
        for _ in 0..5 {
            push_u32(&mut buf, 0);
        }
    }
    push_cstr(&mut buf, "");
    push_u16(&mut buf, 2);
    push_u32(&mut buf, 1_000_000);
    push_i16(&mut buf, 185);
    push_i16(&mut buf, 374);
    push_i32(&mut buf, 0);
    buf.extend(b"0F9999LS");
    if v2 {
        for (n, value) in [100u32, 200, 300, 400, 250].iter().enumerate() {
            push_u32(&mut buf, *value + n as u32);
        }
    }
    push_cstr(&mut buf, "patch panel");
    buf
}

#[test]
fn test_key_events_block_v2() {
    let mut buf = sample_key_events(true);
    push_u32(&mut buf, 576);
    push_i32(&mut buf, 0);
    push_u32(&mut buf, 182_809);
    push_i32(&mut buf, 37_123);
    push_u16(&mut buf, 24_516);

    let (_, parsed) = key_events_block(&buf, 200, 1.4685).unwrap();
    assert_eq!(parsed.num_events, 2);
    assert_eq!(parsed.events.len(), 2);

    let first = &parsed.events[0];
    assert_eq!(first.event_number, 1);
    assert_eq!(first.time_of_travel_100ps, 0);
    assert_eq!(first.distance_m, 0.0);
    assert_eq!(first.splice_loss_db, -0.215);
    assert_eq!(first.reflectance_db, -46.671);
    assert_eq!(first.event_type, "1F9999LS");
    assert_eq!(
        first.event_type_description,
        "reflective, end-of-fiber, launch-fiber"
    );
    assert_eq!(first.comment, "");

    let second = &parsed.events[1];
    assert_eq!(second.distance_m, time_to_distance_m(1_000_000, 1.4685));
    assert_eq!(second.slope_db_km, 0.185);
    assert_eq!(second.splice_loss_db, 0.374);
    assert_eq!(second.end_of_previous_event, Some(100));
    assert_eq!(second.start_of_current_event, Some(201));
    assert_eq!(second.end_of_current_event, Some(302));
    assert_eq!(second.start_of_next_event, Some(403));
    assert_eq!(second.peak_of_current_event, Some(254));
    assert_eq!(second.comment, "patch panel");

    assert_eq!(parsed.total_loss_db, Some(0.576));
    assert_eq!(parsed.fiber_start_position, Some(0));
    assert_eq!(parsed.fiber_length_100ps, Some(182_809));
    assert_eq!(parsed.fiber_length_m, Some(time_to_distance_m(182_809, 1.4685)));
    assert_eq!(parsed.fiber_length_01m, Some(37_123));
    assert_eq!(parsed.optical_return_loss_db, Some(24.516));
}

#[test]
fn test_key_events_block_v1_has_no_neighbourhood() {
    let buf = sample_key_events(false);
    let (_, parsed) = key_events_block(&buf, 100, 1.4685).unwrap();
    assert_eq!(parsed.events.len(), 2);
    assert_eq!(parsed.events[1].end_of_previous_event, None);
    assert_eq!(parsed.events[1].peak_of_current_event, None);
    // No summary bytes at all: every summary field stays unset
    assert_eq!(parsed.total_loss_db, None);
    assert_eq!(parsed.optical_return_loss_db, None);
}

#[test]
fn test_key_events_short_tail_keeps_partial_summary() {
    let mut buf = sample_key_events(true);
    push_u32(&mut buf, 576);
    push_i32(&mut buf, 12);
    // Tail ends here: no fibre length, no ORL
    let (_, parsed) = key_events_block(&buf, 200, 1.4685).unwrap();
    assert_eq!(parsed.total_loss_db, Some(0.576));
    assert_eq!(parsed.fiber_start_position, Some(12));
    assert_eq!(parsed.fiber_length_100ps, None);
    assert_eq!(parsed.fiber_length_m, None);
    assert_eq!(parsed.optical_return_loss_db, None);
}

#[test]
fn test_key_events_no_events_still_reads_summary() {
    let mut buf = Vec::new();
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 1234);
    push_i32(&mut buf, 0);
    push_u32(&mut buf, 98_765);
    push_i32(&mut buf, 0);
    push_u16(&mut buf, 21_000);
    let (_, parsed) = key_events_block(&buf, 200, 1.4685).unwrap();
    assert!(parsed.events.is_empty());
    assert_eq!(parsed.total_loss_db, Some(1.234));
    assert_eq!(parsed.optical_return_loss_db, Some(21.0));
}

#[test]
fn test_key_events_v1_orl_follows_length_directly() {
    let buf_events = sample_key_events(false);
    let mut buf = buf_events;
    push_u32(&mut buf, 576);
    push_i32(&mut buf, 0);
    push_u32(&mut buf, 182_809);
    push_u16(&mut buf, 24_516);
    let (_, parsed) = key_events_block(&buf, 100, 1.4685).unwrap();
    assert_eq!(parsed.fiber_length_01m, None);
    assert_eq!(parsed.optical_return_loss_db, Some(24.516));
}

#[test]
fn test_data_points_block_summary_only() {
    let mut buf = Vec::new();
    push_u32(&mut buf, 30_000);
    push_u16(&mut buf, 1);
    // Sample bytes that must not be read in summary mode
    push_u32(&mut buf, 2);
    push_u16(&mut buf, 1000);
    push_u16(&mut buf, 500);
    push_u16(&mut buf, 501);

    let (_, parsed) = data_points_block(&buf, false).unwrap();
    assert_eq!(parsed.num_data_points, 30_000);
    assert_eq!(parsed.num_traces, 1);
    assert!(parsed.traces.is_none());
    assert!(parsed.note.contains("skipped"));
}

#[test]
fn test_data_points_block_with_samples() {
    let mut buf = Vec::new();
    push_u32(&mut buf, 2);
    push_u16(&mut buf, 1);
    push_u32(&mut buf, 2);
    push_u16(&mut buf, 1000);
    push_u16(&mut buf, 500);
    push_u16(&mut buf, 501);

    let (_, parsed) = data_points_block(&buf, true).unwrap();
    let traces = parsed.traces.unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(
        traces[0],
        TraceData {
            num_points: 2,
            scale_factor: 1000,
            samples: vec![500, 501],
        }
    );
    assert!(parsed.note.contains("included"));
}

#[test]
fn test_block_failure_classifies_eof_as_truncation() {
    let err = le_u32::<_, nom::error::Error<&[u8]>>(&b"ab"[..]).unwrap_err();
    match block_failure(BLOCK_ID_DATAPTS, err) {
        SorError::Truncated { block, .. } => assert_eq!(block, BLOCK_ID_DATAPTS),
        other => panic!("expected Truncated, got {:?}", other),
    }
}
