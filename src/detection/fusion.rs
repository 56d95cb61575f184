use super::{DetectionResult, SubmissionType, NO_ANIMAL};

/// Default gun image confidence at which a gun counts as seen
pub const GUN_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Fused detector output, before it is stamped with a capture time
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub animal: String,
    pub gunshot: bool,
}

/// Combine detector results for a submission type.
///
/// - `Animal`: pass the label through; gunshot is always false.
/// - `Gun`: gunshot is the OR of `confidence >= threshold` and the audio flag.
/// - `Both`: pass the label through; gunshot is the audio flag alone.
///
/// Results for detectors the type does not use are ignored.
pub fn fuse(submission_type: SubmissionType, results: &[DetectionResult], threshold: f64) -> Verdict {
    let mut label = None;
    let mut confidence = None;
    let mut flag = None;

    for result in results {
        match result {
            DetectionResult::AnimalLabel(l) => label = Some(l.clone()),
            DetectionResult::GunScore(c) => confidence = Some(*c),
            DetectionResult::GunshotFlag(f) => flag = Some(*f),
        }
    }

    let animal_label = || label.clone().unwrap_or_else(|| NO_ANIMAL.to_string());
    let gunshot_heard = flag.unwrap_or(false);

    match submission_type {
        SubmissionType::Animal => Verdict {
            animal: animal_label(),
            gunshot: false,
        },
        SubmissionType::Gun => {
            let gun_seen = confidence.map_or(false, |c| c >= threshold);
            Verdict {
                animal: NO_ANIMAL.to_string(),
                gunshot: gun_seen || gunshot_heard,
            }
        }
        SubmissionType::Both => Verdict {
            animal: animal_label(),
            gunshot: gunshot_heard,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gun(confidence: f64, flag: bool) -> Verdict {
        fuse(
            SubmissionType::Gun,
            &[
                DetectionResult::GunScore(confidence),
                DetectionResult::GunshotFlag(flag),
            ],
            GUN_CONFIDENCE_THRESHOLD,
        )
    }

    #[test]
    fn test_animal_never_reports_gunshot() {
        let verdict = fuse(
            SubmissionType::Animal,
            &[
                DetectionResult::AnimalLabel("Elephant".to_string()),
                DetectionResult::GunshotFlag(true),
                DetectionResult::GunScore(0.99),
            ],
            GUN_CONFIDENCE_THRESHOLD,
        );
        assert_eq!(verdict.animal, "Elephant");
        assert!(!verdict.gunshot);
    }

    #[test]
    fn test_gun_is_logical_or() {
        assert!(!gun(0.2, false).gunshot);
        assert!(gun(0.73, false).gunshot);
        assert!(gun(0.1, true).gunshot);
        assert!(gun(0.9, true).gunshot);
        assert_eq!(gun(0.9, true).animal, "No");
    }

    #[test]
    fn test_gun_threshold_is_inclusive() {
        assert!(gun(0.5, false).gunshot);
        assert!(!gun(0.49, false).gunshot);
    }

    #[test]
    fn test_both_uses_audio_flag_only() {
        let verdict = fuse(
            SubmissionType::Both,
            &[
                DetectionResult::AnimalLabel("Tiger".to_string()),
                DetectionResult::GunScore(1.0),
                DetectionResult::GunshotFlag(false),
            ],
            GUN_CONFIDENCE_THRESHOLD,
        );
        assert_eq!(verdict.animal, "Tiger");
        assert!(!verdict.gunshot);

        let verdict = fuse(
            SubmissionType::Both,
            &[
                DetectionResult::AnimalLabel("Tiger".to_string()),
                DetectionResult::GunshotFlag(true),
            ],
            GUN_CONFIDENCE_THRESHOLD,
        );
        assert!(verdict.gunshot);
    }

    #[test]
    fn test_missing_label_defaults_to_no() {
        let verdict = fuse(SubmissionType::Animal, &[], GUN_CONFIDENCE_THRESHOLD);
        assert_eq!(verdict.animal, "No");
    }

    #[test]
    fn test_custom_threshold() {
        let verdict = fuse(
            SubmissionType::Gun,
            &[DetectionResult::GunScore(0.6), DetectionResult::GunshotFlag(false)],
            0.8,
        );
        assert!(!verdict.gunshot);
    }
}
