// output.rs

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::samples::SampleId;

fn create_output_file(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| ProjectionError::io(path, e))
}

/// Writes a PC coordinate table: `FID IID PC1 .. PCk`, tab separated, six decimals.
///
/// When every FID is `"0"` the FID column repeats the IID.
pub fn write_pcs(path: &Path, ids: &[SampleId], pcs: &Array2<f64>, diag: &dyn Diagnostics) -> Result<()> {
    if ids.len() != pcs.nrows() {
        return Err(ProjectionError::DimensionMismatch {
            context: "PC table (sample ids vs coordinate rows)",
            expected: ids.len(),
            found: pcs.nrows(),
        });
    }
    let fid_is_iid = !ids.is_empty() && ids.iter().all(|id| id.fid == "0");
    let mut writer = create_output_file(path)?;
    let io_err = |e: std::io::Error| ProjectionError::io(path, e);

    write!(writer, "FID\tIID").map_err(io_err)?;
    for i in 1..=pcs.ncols() {
        write!(writer, "\tPC{}", i).map_err(io_err)?;
    }
    writeln!(writer).map_err(io_err)?;

    for (id, row) in ids.iter().zip(pcs.rows()) {
        let fid = if fid_is_iid { &id.iid } else { &id.fid };
        write!(writer, "{}\t{}", fid, id.iid).map_err(io_err)?;
        for v in row.iter() {
            write!(writer, "\t{:.6}", v).map_err(io_err)?;
        }
        writeln!(writer).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    diag.info(&format!("PC scores written to {}", path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use ndarray::array;
    use std::fs;

    #[test]
    fn table_has_header_and_six_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.pcs");
        let ids = vec![SampleId::new("fam", "a"), SampleId::new("fam", "b")];
        let pcs = array![[1.0, -0.25], [1.0 / 3.0, 2.5e-7]];
        let diag = RecordingDiagnostics::new();
        write_pcs(&path, &ids, &pcs, &diag).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "FID\tIID\tPC1\tPC2");
        assert_eq!(lines[1], "fam\ta\t1.000000\t-0.250000");
        assert_eq!(lines[2], "fam\tb\t0.333333\t0.000000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn all_zero_fids_are_replaced_by_iids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stu.pcs");
        let ids = vec![SampleId::new("0", "x1"), SampleId::new("0", "x2")];
        let diag = RecordingDiagnostics::new();
        write_pcs(&path, &ids, &array![[0.5], [1.5]], &diag).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("x1\tx1\t"));
    }

    #[test]
    fn row_count_must_match_ids() {
        let dir = tempfile::tempdir().unwrap();
        let diag = RecordingDiagnostics::new();
        let ids = vec![SampleId::new("f", "a")];
        assert!(matches!(
            write_pcs(&dir.path().join("x.pcs"), &ids, &array![[0.0], [1.0]], &diag),
            Err(ProjectionError::DimensionMismatch { .. })
        ));
    }
}
