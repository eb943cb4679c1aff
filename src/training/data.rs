//! Dataset loading and the stratified train/test split

use crate::types::frame::{Frame, FrameError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}, column {column}: {value:?} is not a number")]
    Parse {
        line: usize,
        column: String,
        value: String,
    },

    #[error("dataset has no rows")]
    Empty,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("row {row}: label {value} is not 0 or 1")]
    InvalidLabel { row: usize, value: f64 },

    #[error("test_size must lie in (0, 1), got {0}")]
    InvalidTestSize(f64),

    #[error("cannot split {rows} rows with test_size {test_size}")]
    SplitTooSmall { rows: usize, test_size: f64 },

    #[error("class {class} has {count} member(s); stratification needs at least 2")]
    ClassTooSmall { class: u8, count: usize },
}

/// Result of [`split_data`]
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Frame,
    pub x_test: Frame,
    pub y_train: Vec<u8>,
    pub y_test: Vec<u8>,
}

/// Load a CSV file with a header row; every cell must be numeric
pub fn load_data<P: AsRef<Path>>(path: P) -> Result<Frame, DataError> {
    let path = path.as_ref();
    let reader = csv::Reader::from_path(path).map_err(|source| DataError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let frame = read_frame(reader)?;
    info!(
        path = %path.display(),
        rows = frame.len(),
        columns = frame.num_columns(),
        "Loaded dataset"
    );
    Ok(frame)
}

/// Parse CSV from any reader
pub fn read_csv<R: io::Read>(source: R) -> Result<Frame, DataError> {
    read_frame(csv::Reader::from_reader(source))
}

fn read_frame<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Frame, DataError> {
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = record
            .iter()
            .zip(&columns)
            .map(|(cell, column)| {
                cell.trim().parse::<f64>().map_err(|_| DataError::Parse {
                    // header is line 1
                    line: i + 2,
                    column: column.clone(),
                    value: cell.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(DataError::Empty);
    }
    Ok(Frame::new(columns, rows)?)
}

/// Convert a target column to binary labels
pub fn to_labels(values: &[f64]) -> Result<Vec<u8>, DataError> {
    values
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            if value == 0.0 {
                Ok(0)
            } else if value == 1.0 {
                Ok(1)
            } else {
                Err(DataError::InvalidLabel { row, value })
            }
        })
        .collect()
}

/// Feature columns, skipping the excluded ones
pub fn feature_columns(frame: &Frame, exclude: &[&str]) -> Vec<String> {
    frame.columns_excluding(exclude)
}

/// Split into train and test sets, preserving the class ratio.
///
/// The test set holds `ceil(n * test_size)` rows, allocated to each class in
/// proportion to its size with leftover rows going to the largest remainders.
pub fn split_data(
    frame: &Frame,
    target: &str,
    test_size: f64,
    random_state: u64,
) -> Result<TrainTestSplit, DataError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DataError::InvalidTestSize(test_size));
    }

    let (features, raw_labels) = frame.split_off_column(target)?;
    let labels = to_labels(&raw_labels)?;

    let n = labels.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(DataError::SplitTooSmall { rows: n, test_size });
    }

    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        by_class[usize::from(label)].push(i);
    }
    for (class, members) in by_class.iter().enumerate() {
        if members.len() == 1 {
            return Err(DataError::ClassTooSmall {
                class: class as u8,
                count: 1,
            });
        }
    }

    let allocation = allocate(&[by_class[0].len(), by_class[1].len()], n_test);

    let mut rng = StdRng::seed_from_u64(random_state);
    let mut train_idx = Vec::with_capacity(n - n_test);
    let mut test_idx = Vec::with_capacity(n_test);
    for (members, &take) in by_class.iter_mut().zip(&allocation) {
        members.shuffle(&mut rng);
        test_idx.extend_from_slice(&members[..take]);
        train_idx.extend_from_slice(&members[take..]);
    }
    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    let pick = |idx: &[usize]| idx.iter().map(|&i| labels[i]).collect::<Vec<u8>>();
    let split = TrainTestSplit {
        x_train: features.select_rows(&train_idx),
        x_test: features.select_rows(&test_idx),
        y_train: pick(&train_idx),
        y_test: pick(&test_idx),
    };

    info!(
        train_rows = split.y_train.len(),
        test_rows = split.y_test.len(),
        train_fraud = split.y_train.iter().filter(|&&y| y == 1).count(),
        test_fraud = split.y_test.iter().filter(|&&y| y == 1).count(),
        "Stratified split"
    );
    Ok(split)
}

/// Distribute `total` across classes proportionally to `counts`
fn allocate(counts: &[usize; 2], total: usize) -> [usize; 2] {
    let n: usize = counts.iter().sum();
    let shares = counts.map(|c| c as f64 * total as f64 / n as f64);
    let mut taken = shares.map(|s| s.floor() as usize);

    let mut order = [0, 1];
    order.sort_by(|&a, &b| {
        let frac = |i: usize| shares[i] - taken[i] as f64;
        frac(b).total_cmp(&frac(a))
    });

    let mut remaining = total - taken.iter().sum::<usize>();
    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if taken[class] < counts[class] {
            taken[class] += 1;
            remaining -= 1;
        }
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> Frame {
        read_csv(
            "V1,V2,Amount,Time,Class\n\
             1.0,1.1,100,0,0\n\
             2.0,2.1,200,1,0\n\
             3.0,3.1,300,2,0\n\
             4.0,4.1,400,3,0\n\
             5.0,5.1,500,4,0\n\
             6.0,6.1,600,5,0\n\
             7.0,7.1,700,6,0\n\
             8.0,8.1,800,7,1\n\
             9.0,9.1,900,8,1\n\
             10.0,10.1,1000,9,1\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_read_csv() {
        let frame = sample_data();
        assert_eq!(frame.len(), 10);
        assert_eq!(frame.columns(), &["V1", "V2", "Amount", "Time", "Class"]);
        assert_eq!(frame.column("Amount").unwrap()[2], 300.0);
    }

    #[test]
    fn test_read_csv_quoted_labels() {
        let frame = read_csv("Amount,\"Class\"\n1.5,\"0\"\n2.5,\"1\"\n".as_bytes()).unwrap();
        assert_eq!(frame.column("Class").unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_read_csv_rejects_text() {
        let err = read_csv("V1,Amount\n1.0,abc\n".as_bytes()).unwrap_err();
        match err {
            DataError::Parse { line, column, value } => {
                assert_eq!(line, 2);
                assert_eq!(column, "Amount");
                assert_eq!(value, "abc");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_read_csv_empty() {
        assert!(matches!(
            read_csv("V1,Amount\n".as_bytes()),
            Err(DataError::Empty)
        ));
    }

    #[test]
    fn test_load_data_missing_file() {
        assert!(matches!(
            load_data("does/not/exist.csv"),
            Err(DataError::Read { .. })
        ));
    }

    #[test]
    fn test_split_data_shapes() {
        let split = split_data(&sample_data(), "Class", 0.3, 42).unwrap();

        assert_eq!(split.x_train.len(), 7);
        assert_eq!(split.x_test.len(), 3);
        assert_eq!(split.y_train.len(), 7);
        assert_eq!(split.y_test.len(), 3);
    }

    #[test]
    fn test_split_data_is_stratified() {
        let split = split_data(&sample_data(), "Class", 0.2, 42).unwrap();

        assert_eq!(split.y_test.len(), 2);
        assert_eq!(split.y_test.iter().filter(|&&y| y == 1).count(), 1);
        assert_eq!(split.y_train.iter().filter(|&&y| y == 1).count(), 2);
    }

    #[test]
    fn test_split_data_no_target_leakage() {
        let split = split_data(&sample_data(), "Class", 0.2, 42).unwrap();

        assert!(split.x_train.column_index("Class").is_none());
        assert!(split.x_test.column_index("Class").is_none());
        assert!(split.x_train.column_index("Time").is_some());
    }

    #[test]
    fn test_split_data_rows_follow_labels() {
        let split = split_data(&sample_data(), "Class", 0.3, 7).unwrap();

        // Fraud rows are exactly those with V1 >= 8
        for (x, y) in [(&split.x_train, &split.y_train), (&split.x_test, &split.y_test)] {
            let v1 = x.column("V1").unwrap();
            for (value, label) in v1.iter().zip(y.iter()) {
                assert_eq!(*label == 1, *value >= 8.0);
            }
        }
    }

    #[test]
    fn test_split_data_is_reproducible() {
        let a = split_data(&sample_data(), "Class", 0.3, 42).unwrap();
        let b = split_data(&sample_data(), "Class", 0.3, 42).unwrap();
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train, b.y_train);
    }

    #[test]
    fn test_split_data_errors() {
        let frame = sample_data();
        assert!(matches!(
            split_data(&frame, "Label", 0.2, 42),
            Err(DataError::Frame(FrameError::UnknownColumn(_)))
        ));
        assert!(matches!(
            split_data(&frame, "Class", 1.0, 42),
            Err(DataError::InvalidTestSize(_))
        ));
        assert!(matches!(
            split_data(&frame, "Amount", 0.2, 42),
            Err(DataError::InvalidLabel { row: 0, .. })
        ));

        let single_fraud =
            read_csv("V1,Class\n1,0\n2,0\n3,0\n4,1\n".as_bytes()).unwrap();
        assert!(matches!(
            split_data(&single_fraud, "Class", 0.5, 42),
            Err(DataError::ClassTooSmall { class: 1, count: 1 })
        ));
    }

    #[test]
    fn test_feature_columns() {
        let features = feature_columns(&sample_data(), &["Time", "Class"]);

        assert!(!features.contains(&"Time".to_string()));
        assert!(!features.contains(&"Class".to_string()));
        assert!(features.contains(&"V1".to_string()));
        assert!(features.contains(&"Amount".to_string()));
    }

    #[test]
    fn test_allocate() {
        assert_eq!(allocate(&[7, 3], 2), [1, 1]);
        assert_eq!(allocate(&[7, 3], 3), [2, 1]);
        assert_eq!(allocate(&[990, 10], 200), [198, 2]);
        assert_eq!(allocate(&[10, 0], 3), [3, 0]);
    }
}
