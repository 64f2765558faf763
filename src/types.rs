/// This module contains the struct definitions for everything we pull out
/// of a SOR file, from the raw map directory through to the assembled,
/// JSON-serialisable record.
use serde::Serialize;

/// A BlockDescriptor names one block in the file, as listed in the map.
/// The offset is not stored on disk; it is the running sum of the sizes of
/// all preceding blocks, with the map's own entry first at offset zero.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct BlockDescriptor {
    /// Name of the block, e.g. "GenParams"
    pub name: String,
    /// Revision number - major (3 digits), minor, cosmetic. Layouts change
    /// at 200: revisions below it use the version-1 field set.
    pub version: u16,
    /// Size in bytes of the block
    pub size: u32,
    /// Absolute byte offset of the block within the file
    pub offset: u32,
}

/// Every SOR file opens with a map block which acts as a directory of the
/// file's contents.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct MapBlock {
    /// Revision number for the file as a whole
    pub version: u16,
    /// Total size of the map block, including its own header
    pub nbytes: u32,
    /// Block count as declared by version-1 files. Advisory only; entry
    /// reading always terminates on the declared byte count.
    pub declared_block_count: Option<u16>,
    /// Descriptors for every block in the file, in file order
    pub blocks: Vec<BlockDescriptor>,
}

/// Supplier parameters describe the OTDR unit the test was run on, such as
/// the optical module ID and serial number. Often the "other" field also
/// carries calibration dates.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct SupplierParams {
    /// Manufacturer of the OTDR
    pub supplier: String,
    /// Mainframe model number
    pub otdr_mainframe_id: String,
    /// Mainframe serial number
    pub otdr_mainframe_sn: String,
    /// Optical module model number
    pub optical_module_id: String,
    /// Optical module serial number
    pub optical_module_sn: String,
    /// Software revision
    pub software_revision: String,
    /// Free text
    pub other: String,
}

/// General parameters identify the cable and fibre under test and how the
/// test was recorded.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct GeneralParams {
    /// Language code - EN, CN, JP, etc.
    pub language_code: String,
    /// Cable identifier
    pub cable_id: String,
    /// Fibre identifier
    pub fiber_id: String,
    /// Fibre type, coded as the ITU-T standard definition sans letters,
    /// e.g. 652, 657
    pub fiber_type: u16,
    /// Readable name for the fibre type; unknown codes pass through raw
    pub fiber_type_name: String,
    /// Nominal test wavelength in nm
    pub wavelength_nm: u16,
    /// Start location for the test
    pub location_a: String,
    /// End location for the test
    pub location_b: String,
    /// Cable code - free field
    pub cable_code: String,
    /// Build condition: BC as-built, CC as-current, RC as-repaired, OT other
    pub build_condition: String,
    /// Readable name for the build condition; unknown codes pass through raw
    pub build_condition_name: String,
    /// Launch lead length from the front panel, in 100 ps increments
    pub user_offset_100ps: i32,
    /// As user_offset_100ps but in 0.1 distance units; version 2 files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_offset_distance_01m: Option<i32>,
    /// Operator of the unit for the test
    pub operator: String,
    /// Free comment field
    pub comment: String,
}

/// Acquisition parameters from the fixed parameters block: when the test
/// ran and with what settings, plus everything needed to interpret the
/// stored trace.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct AcquisitionParams {
    /// Acquisition timestamp, unix epoch seconds, 32-bit
    pub timestamp_epoch: u32,
    /// The timestamp as RFC 3339 UTC; null when the epoch does not map to
    /// a valid calendar instant
    pub timestamp_utc: Option<String>,
    /// Units of distance - km, mt, ft, kf, mi, etc.
    pub distance_unit: String,
    /// Actual wavelength used in nm, normally the factory-calibrated one
    pub wavelength_nm: u16,
    /// Length of fibre from the OTDR port to the first data point, in
    /// 100 ps increments
    pub acquisition_offset_100ps: i32,
    /// As acquisition_offset_100ps but in 0.1 distance units; version 2 only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_offset_distance_01m: Option<i32>,
    /// Number of pulse widths stored in this file
    pub num_pulse_widths: u16,
    /// Pulse widths used, in nanoseconds; one entry per pulse width
    pub pulse_widths_ns: Vec<u16>,
    /// Data spacing in 100 ps increments; one entry per pulse width
    pub data_spacing_100ps: Vec<u32>,
    /// Number of points stored for each pulse width
    pub num_data_points: Vec<u32>,
    /// Group index of the fibre, stored on disk as 100000x the value
    pub group_index: f64,
    /// Backscatter coefficient in dB; stored on disk as a positive 10x value
    pub backscatter_db: f64,
    /// Number of samples averaged to produce the result
    pub num_averages: u32,
    /// Averaging time in seconds, as an alternative to num_averages
    pub averaging_time_s: u16,
    /// Acquisition range set to reach the end of the fibre, 100 ps units
    pub range_100ps: u32,
    /// The range as km of light travel time (1e-6 x range_100ps). This is
    /// a time-derived figure independent of group index; both forms are
    /// kept because neither name is quite honest about the units.
    pub range_km: f64,
    /// Acquisition range in 0.1 distance units; version 2 only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_range_distance_01m: Option<i32>,
    /// Time between the optical TRX and the front panel connector, 100 ps
    pub front_panel_offset_100ps: i32,
    /// Lowest power level for which 98% of the noise data lies below
    pub noise_floor_level: u16,
    /// Scale factor for the noise floor level
    pub noise_floor_scale_factor: u16,
    /// Attenuation applied by the instrument at the first point, dB*1000
    pub power_offset_first_point: u16,
    /// Threshold in dB for declaring a loss event
    pub loss_threshold_db: f64,
    /// Threshold in dB for declaring a reflectance event
    pub reflectance_threshold_db: f64,
    /// Loss in dB taken to mark the end of the fibre
    pub end_of_fiber_threshold_db: f64,
    /// Trace type code: ST standard, RT reverse, DT difference, RF
    /// reference. Version 2 files only, and only when the block has room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_type: Option<String>,
    /// Readable name for the trace type; unknown codes pass through raw
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_type_name: Option<String>,
}

/// A single event along the fibre path found by the OTDR's event locator:
/// a splice, connector, macrobend, reflection or the fibre end.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct KeyEvent {
    /// Event number, counting from 1
    pub event_number: u16,
    /// Round-trip light travel time from the front panel to the event,
    /// in 100 ps increments
    pub time_of_travel_100ps: u32,
    /// One-way distance to the event in metres, derived from the travel
    /// time and the group index in force for the parse
    pub distance_m: f64,
    /// Span loss of the fibre entering the event, dB/km
    pub slope_db_km: f64,
    /// Splice loss for the event, dB
    pub splice_loss_db: f64,
    /// Reflectance for the event, dB (negative for real reflections)
    pub reflectance_db: f64,
    /// Raw event-type code, e.g. "1F9999LS"
    pub event_type: String,
    /// Interpretation of the code's reflectance class, origin and
    /// launch/tail marker
    pub event_type_description: String,
    /// End of the previous event, 100 ps; version 2 files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_previous_event: Option<u32>,
    /// Start of this event, 100 ps; version 2 files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_of_current_event: Option<u32>,
    /// End of this event, 100 ps; version 2 files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_current_event: Option<u32>,
    /// Start of the next event, 100 ps; version 2 files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_of_next_event: Option<u32>,
    /// Peak of this event, 100 ps; version 2 files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_of_current_event: Option<u32>,
    /// Free comment on the event
    pub comment: String,
}

/// The key events block: the event list plus the end-to-end summary that
/// trails it. Summary fields are best-effort; instruments disagree on how
/// much of the tail they write, so a short tail simply leaves later fields
/// unset.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct KeyEventsBlock {
    /// Number of events in the block
    pub num_events: u16,
    /// The events, exactly num_events of them
    pub events: Vec<KeyEvent>,
    /// Loss over the whole measurement span, dB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_loss_db: Option<f64>,
    /// Start of the measurement span, 100 ps from the front panel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_start_position: Option<i32>,
    /// Length of the measured fibre as round-trip time, 100 ps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_length_100ps: Option<u32>,
    /// Length of the measured fibre in metres, derived as for events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_length_m: Option<f64>,
    /// Length of the measured fibre in 0.1 distance units; version 2 only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_length_01m: Option<i32>,
    /// Optical return loss over the span, dB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optical_return_loss_db: Option<f64>,
}

/// One trace section from the data points block: the sample values taken
/// at a single scale factor.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct TraceData {
    /// Number of samples in this section
    pub num_points: u32,
    /// Scale factor for the samples, as 1000x the factor
    pub scale_factor: u16,
    /// Samples as dB*1000 below the zero reference
    pub samples: Vec<u16>,
}

/// Summary of the data points block. The backscatter samples themselves
/// are skipped unless extraction was requested, as they dwarf the rest of
/// the record.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct DataPointsInfo {
    /// Total number of samples stored in the file
    pub num_data_points: u32,
    /// Number of trace sections (one per scale factor)
    pub num_traces: u16,
    /// Tells readers of the serialised record what happened to the samples
    pub note: String,
    /// The raw trace sections; only populated on request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceData>>,
}

/// The outcome of decoding one block. Serialises either as the block's
/// fields or as an object with a single "error" key, so consumers must
/// check for "error" before reading fields.
#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(untagged)]
pub enum BlockOutcome<T> {
    Decoded(T),
    Failed { error: String },
}

impl<T> BlockOutcome<T> {
    /// The decoded block, if decoding succeeded.
    pub fn decoded(&self) -> Option<&T> {
        match self {
            BlockOutcome::Decoded(inner) => Some(inner),
            BlockOutcome::Failed { .. } => None,
        }
    }

    /// The failure message, if decoding failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            BlockOutcome::Decoded(_) => None,
            BlockOutcome::Failed { error } => Some(error),
        }
    }
}

/// The assembled record for one SOR file. Block slots are present when the
/// map listed the block, and each holds either the decoded fields or the
/// decode failure; blocks fail independently of one another.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct SorRecord {
    /// Name of the parsed file
    pub filename: String,
    /// Size of the parsed file in bytes
    pub file_size_bytes: u64,
    /// Names of all blocks listed in the map, in file order, including
    /// vendor-proprietary blocks we do not decode
    pub blocks_found: Vec<String>,
    /// From SupParams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<BlockOutcome<SupplierParams>>,
    /// From GenParams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<BlockOutcome<GeneralParams>>,
    /// From FxdParams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<BlockOutcome<AcquisitionParams>>,
    /// From KeyEvents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_events: Option<BlockOutcome<KeyEventsBlock>>,
    /// From DataPts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_points: Option<BlockOutcome<DataPointsInfo>>,
}
