use std::path::Path;

use csv::StringRecord;

use crate::{PipelineErr, Result};

const TARGET_COLUMN: &str = "target";

/// Writes the predictions into a copy of the submission template.
///
/// Predictions are assigned to the template rows by position, not by `image_name`: the i-th
/// prediction belongs to the i-th template row. Every other column is copied unchanged and no
/// index column is added.
///
/// # Arguments
/// * `template` - The sample submission with a `target` column.
/// * `predictions` - One probability per template row.
/// * `output` - Where to write the submission.
///
/// # Returns
/// The amount of rows written.
///
/// # Errors
/// `SubmissionLength` if there isn't exactly one prediction per template row.
pub fn write_submission<P, Q>(template: P, predictions: &[f32], output: Q) -> Result<usize>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let template = template.as_ref();
    let read_err = |source| PipelineErr::Csv {
        path: template.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(template).map_err(read_err)?;
    let headers = reader.headers().map_err(read_err)?.clone();
    let target_idx = headers
        .iter()
        .position(|h| h.trim() == TARGET_COLUMN)
        .ok_or_else(|| PipelineErr::MissingColumn {
            path: template.to_path_buf(),
            column: TARGET_COLUMN,
        })?;

    let rows = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(read_err)?;

    if rows.len() != predictions.len() {
        return Err(PipelineErr::SubmissionLength {
            predictions: predictions.len(),
            rows: rows.len(),
        });
    }

    let output = output.as_ref();
    let write_err = |source| PipelineErr::Csv {
        path: output.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(output).map_err(write_err)?;
    writer.write_record(&headers).map_err(write_err)?;

    for (row, prediction) in rows.iter().zip(predictions) {
        let target = prediction.to_string();
        let record: StringRecord = row
            .iter()
            .enumerate()
            .map(|(i, field)| if i == target_idx { target.as_str() } else { field })
            .collect();
        writer.write_record(&record).map_err(write_err)?;
    }

    writer
        .flush()
        .map_err(|source| PipelineErr::Io {
            path: output.to_path_buf(),
            source,
        })?;

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const TEMPLATE: &str = "image_name,target\nISIC_3,0\nISIC_1,0\nISIC_2,0\n";

    #[test]
    fn overwrites_targets_in_template_order() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("sample_submission.csv");
        let output = dir.path().join("submission.csv");
        fs::write(&template, TEMPLATE).unwrap();

        let rows = write_submission(&template, &[0.25, 0.5, 1.], &output).unwrap();
        assert_eq!(rows, 3);

        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines, ["image_name,target", "ISIC_3,0.25", "ISIC_1,0.5", "ISIC_2,1"]);
    }

    #[test]
    fn other_columns_are_kept_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("sample_submission.csv");
        let output = dir.path().join("submission.csv");
        fs::write(&template, "target,image_name,site\n0,ISIC_1,head\n").unwrap();

        write_submission(&template, &[0.75], &output).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(written, "target,image_name,site\n0.75,ISIC_1,head\n");
    }

    #[test]
    fn length_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("sample_submission.csv");
        fs::write(&template, TEMPLATE).unwrap();

        let res = write_submission(&template, &[0.5, 0.5], dir.path().join("submission.csv"));
        assert!(matches!(
            res,
            Err(PipelineErr::SubmissionLength {
                predictions: 2,
                rows: 3
            })
        ));
    }

    #[test]
    fn template_needs_a_target_column() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("sample_submission.csv");
        fs::write(&template, "image_name\nISIC_1\n").unwrap();

        let res = write_submission(&template, &[0.5], dir.path().join("submission.csv"));
        assert!(matches!(res, Err(PipelineErr::MissingColumn { .. })));
    }
}
