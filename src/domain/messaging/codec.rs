//! Body codecs for cost computation requests and replies.

use crate::domain::errors::ProtocolError;
use crate::domain::optimization::Genotype;

pub fn encode_genotypes(genotypes: &[Genotype]) -> Result<String, ProtocolError> {
    serde_json::to_string(genotypes).map_err(|e| ProtocolError::Decode {
        what: "genotype batch",
        reason: e.to_string(),
    })
}

/// Decodes a `[[short, long], ...]` batch; zero windows are rejected.
pub fn decode_genotypes(body: &str) -> Result<Vec<Genotype>, ProtocolError> {
    let genotypes: Vec<Genotype> =
        serde_json::from_str(body).map_err(|e| ProtocolError::Decode {
            what: "genotype batch",
            reason: e.to_string(),
        })?;

    if let Some(bad) = genotypes
        .iter()
        .find(|g| g.short_window == 0 || g.long_window == 0)
    {
        return Err(ProtocolError::Decode {
            what: "genotype batch",
            reason: format!("window lengths must be positive, got {}", bad),
        });
    }
    Ok(genotypes)
}

pub fn encode_fitness(values: &[f64]) -> Result<String, ProtocolError> {
    serde_json::to_string(values).map_err(|e| ProtocolError::Decode {
        what: "fitness batch",
        reason: e.to_string(),
    })
}

/// Decodes a fitness list and checks it lines up with the request.
pub fn decode_fitness(body: &str, expected: usize) -> Result<Vec<f64>, ProtocolError> {
    let values: Vec<f64> = serde_json::from_str(body).map_err(|e| ProtocolError::Decode {
        what: "fitness batch",
        reason: e.to_string(),
    })?;

    if values.len() != expected {
        return Err(ProtocolError::LengthMismatch {
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genotype_batch_roundtrip() {
        let batch = vec![Genotype::new(3, 9), Genotype::new(1, 1), Genotype::new(40, 2)];
        let body = encode_genotypes(&batch).unwrap();
        assert_eq!(body, "[[3,9],[1,1],[40,2]]");
        assert_eq!(decode_genotypes(&body).unwrap(), batch);
    }

    #[test]
    fn test_fitness_batch_roundtrip() {
        let values = vec![0.0, -2.5, 1234.125, 1e-9];
        let body = encode_fitness(&values).unwrap();
        assert_eq!(decode_fitness(&body, values.len()).unwrap(), values);
    }

    #[test]
    fn test_decode_genotypes_rejects_garbage() {
        assert!(decode_genotypes("not json").is_err());
        assert!(decode_genotypes("[[1]]").is_err());
        assert!(decode_genotypes("[[0,5]]").is_err());
    }

    #[test]
    fn test_decode_fitness_rejects_short_list() {
        let err = decode_fitness("[1.0, 2.0]", 3).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::LengthMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_decode_fitness_rejects_non_numeric() {
        assert!(decode_fitness(r#"["a"]"#, 1).is_err());
        assert!(decode_fitness("[null]", 1).is_err());
    }

    #[test]
    fn test_empty_batches() {
        assert_eq!(decode_genotypes("[]").unwrap(), Vec::<Genotype>::new());
        assert_eq!(decode_fitness("[]", 0).unwrap(), Vec::<f64>::new());
    }
}
