//! 置信度提取
//!
//! 按候选项给定的顺序扫描，返回第一个置信度严格大于阈值的值。
//! 这是"首个命中"而不是"最高置信度"策略，排序由模型负责。

use crate::model::Candidates;

/// 置信度接受阈值
pub const CONFIDENCE_EDGE: f64 = 0.6;

/// 将一组候选项归约为单个值，无法确定时返回空串
///
/// 首个置信度达标的候选值为 null 时同样结束扫描，结果为空串（未知），
/// 不会渲染成 `<nil>` 之类的占位文本。
pub fn extract_high_confidence_value(candidates: Option<&Candidates>) -> String {
    let Some(candidates) = candidates else {
        return String::new();
    };

    for candidate in candidates.candidates.iter().flatten() {
        // 无法解析的置信度直接跳过，不中断扫描
        let Some(confidence) = candidate.confidence.as_confidence() else {
            continue;
        };
        if confidence > CONFIDENCE_EDGE {
            return candidate.value.render();
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, CandidateValue};

    fn extract(candidates: Vec<Candidate>) -> String {
        extract_high_confidence_value(Some(&Candidates::new(candidates)))
    }

    #[test]
    fn test_single_confident_candidate() {
        assert_eq!(extract(vec![Candidate::new("Engineer", 0.9)]), "Engineer");
    }

    #[test]
    fn test_first_match_not_best_match() {
        let result = extract(vec![
            Candidate::new("X", 0.3),
            Candidate::new("Y", 0.7),
            Candidate::new("Z", 0.95),
        ]);
        assert_eq!(result, "Y");
    }

    #[test]
    fn test_empty_and_absent() {
        assert_eq!(extract(vec![]), "");
        assert_eq!(extract_high_confidence_value(None), "");
    }

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(extract(vec![Candidate::new("Edge", 0.6)]), "");
        assert_eq!(extract(vec![Candidate::new("Above", 0.61)]), "Above");
    }

    #[test]
    fn test_unparseable_confidence_is_skipped() {
        let result = extract(vec![
            Candidate::new("A", "very high"),
            Candidate::new("B", true),
            Candidate {
                value: CandidateValue::from("C"),
                confidence: CandidateValue::Null,
                evidence: String::new(),
            },
            Candidate::new("D", "0.8"),
        ]);
        assert_eq!(result, "D");
    }

    #[test]
    fn test_null_entries_are_skipped() {
        let candidates = Candidates {
            candidates: vec![None, Some(Candidate::new("Teacher", 0.9))],
        };
        assert_eq!(extract_high_confidence_value(Some(&candidates)), "Teacher");
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(extract(vec![Candidate::new(true, 0.9)]), "true");
        assert_eq!(extract(vec![Candidate::new(1.5, 0.9)]), "1.5");
        // 高置信度的 null 同样终止扫描，结果为未知
        assert_eq!(
            extract(vec![
                Candidate::new(CandidateValue::Null, 1.0),
                Candidate::new("Later", 0.9),
            ]),
            ""
        );
    }

    #[test]
    fn test_decoded_heterogeneous_candidates() {
        let candidates: Candidates = serde_json::from_str(
            r#"{"candidates": [
                {"value": "Student", "confidence": "n/a"},
                {"value": "Designer", "confidence": {"score": 0.9}},
                {"value": "Marketing", "confidence": "0.65"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(extract_high_confidence_value(Some(&candidates)), "Marketing");
    }
}
