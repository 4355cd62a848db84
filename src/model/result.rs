use serde::{Deserialize, Serialize};

/// 快照文件的列顺序（与外部消费者约定，不可调整）
pub const SNAPSHOT_HEADERS: [&str; 13] = [
    "user_id",
    "email",
    "is_student",
    "school",
    "major",
    "degree_level",
    "occupation",
    "industry",
    "primary_language",
    "gender",
    "last_task_time",
    "is_guest_mode",
    "plan",
];

/// 用户画像富化结果，按 `user_id` 唯一
///
/// 所有分类字段为空串时表示"未确定"。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub user_id: String,
    pub email: String,
    pub is_student: String,
    pub school: String,
    pub major: String,
    pub degree_level: String,
    pub occupation: String,
    pub industry: String,
    pub primary_language: String,
    pub gender: String,
    pub last_task_time: String,
    pub is_guest_mode: String, // "true" / "false"
    pub plan: String,
}

impl EnrichmentResult {
    /// 按快照列顺序输出
    pub fn to_record(&self) -> [&str; 13] {
        [
            self.user_id.as_str(),
            self.email.as_str(),
            self.is_student.as_str(),
            self.school.as_str(),
            self.major.as_str(),
            self.degree_level.as_str(),
            self.occupation.as_str(),
            self.industry.as_str(),
            self.primary_language.as_str(),
            self.gender.as_str(),
            self.last_task_time.as_str(),
            self.is_guest_mode.as_str(),
            self.plan.as_str(),
        ]
    }

    /// 按快照列顺序解析，缺失的尾部列视为空串
    pub fn from_record<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        let mut result = EnrichmentResult::default();
        for (index, value) in fields.into_iter().enumerate() {
            let value = value.to_string();
            match index {
                0 => result.user_id = value,
                1 => result.email = value,
                2 => result.is_student = value,
                3 => result.school = value,
                4 => result.major = value,
                5 => result.degree_level = value,
                6 => result.occupation = value,
                7 => result.industry = value,
                8 => result.primary_language = value,
                9 => result.gender = value,
                10 => result.last_task_time = value,
                11 => result.is_guest_mode = value,
                12 => result.plan = value,
                _ => {}
            }
        }
        result
    }
}
