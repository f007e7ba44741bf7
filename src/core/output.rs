use csv::Writer;

use crate::error::Result;
use crate::models::EpochStats;

/// Writes one row per epoch: `epoch,loss,data_loss,regularization_loss,accuracy,learning_rate`,
/// followed by the validation columns when present.
pub fn write_history_csv(history: &[EpochStats], file_path: &str) -> Result<()> {
    let mut wtr = Writer::from_path(file_path)?;

    wtr.write_record([
        "epoch",
        "loss",
        "data_loss",
        "regularization_loss",
        "accuracy",
        "learning_rate",
        "validation_loss",
        "validation_accuracy",
    ])?;

    for stats in history {
        let (val_loss, val_accuracy) = match &stats.validation {
            Some(evaluation) => (evaluation.loss.to_string(), evaluation.accuracy.to_string()),
            None => (String::new(), String::new()),
        };
        wtr.write_record(&[
            stats.epoch.to_string(),
            (stats.data_loss + stats.regularization_loss).to_string(),
            stats.data_loss.to_string(),
            stats.regularization_loss.to_string(),
            stats.accuracy.to_string(),
            stats.learning_rate.to_string(),
            val_loss,
            val_accuracy,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Evaluation;

    #[test]
    fn test_history_rows() {
        let history = vec![
            EpochStats {
                epoch: 1,
                data_loss: 0.5,
                regularization_loss: 0.25,
                accuracy: 0.5,
                learning_rate: 0.01,
                validation: None,
            },
            EpochStats {
                epoch: 2,
                data_loss: 0.25,
                regularization_loss: 0.0,
                accuracy: 0.75,
                learning_rate: 0.01,
                validation: Some(Evaluation { loss: 0.3, accuracy: 0.7 }),
            },
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        write_history_csv(&history, path.to_str().unwrap()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,loss,"));
        assert_eq!(lines[1], "1,0.75,0.5,0.25,0.5,0.01,,");
        assert_eq!(lines[2], "2,0.25,0.25,0,0.75,0.01,0.3,0.7");
    }
}
