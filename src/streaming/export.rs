// CSV import/export for two-column `time,value` series

use crate::streaming::types::{Sample, StreamError, StreamResult};
use std::io::Read;

/// Both channels serialized as CSV byte streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvExport {
    pub bpm: Vec<u8>,
    pub uterus: Vec<u8>,
}

/// Write `time,value` header plus one row per sample
pub fn write_series_csv<'a, I>(samples: I) -> StreamResult<Vec<u8>>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["time", "value"])?;
    for sample in samples {
        writer.serialize((sample.time, sample.value))?;
    }
    writer
        .into_inner()
        .map_err(|e| StreamError::Io(e.into_error()))
}

/// Read a `time,value` series.
///
/// The first two columns are used; a header row and any row that does not
/// parse as two finite numbers are skipped.
pub fn read_series_csv<R: Read>(reader: R) -> StreamResult<Vec<Sample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let (Some(t), Some(v)) = (record.get(0), record.get(1)) else {
            continue;
        };
        match (t.parse::<f64>(), v.parse::<f64>()) {
            (Ok(t), Ok(v)) if t.is_finite() && v.is_finite() => samples.push(Sample::new(t, v)),
            _ => continue,
        }
    }
    Ok(samples)
}
