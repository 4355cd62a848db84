//! 提示词模板与用户描述构建

use crate::model::UserAggregate;

/// 不携带画像信号的任务类型（原始文档抽取）
pub const DOC_EXTRACTION_TASK_TYPE: &str = "doc_extraction";

/// 单个列表段落的字节预算，放不下的条目跳过
pub const SECTION_CHAR_BUDGET: usize = 12_000;

/// 单个条目的字节上限，超长条目截断
pub const ITEM_CHAR_BUDGET: usize = 2_000;

pub const USER_AVATAR_PROMPT: &str =
    "The picture given to you is an avatar, describe the content of this picture";

pub const USER_INSIGHT_SYSTEM_PROMPT: &str = r#"
You are an AI assistant specialized in user profiling. Based on the following user profile and task records, analyze and infer the user's attributes and return the result in a structured JSON format.

### Requirements

1. For each attribute, return your output in **JSON format**.
2. For each attribute, include a "candidates" array. Each candidate must contain:
   - "value": the predicted value
   - "confidence": a float between 0 and 1 (your estimated likelihood)
   - "evidence": a short explanation of what input led you to this conclusion
3. Order the candidates from the most to the least likely.
4. If no information is available for an attribute, return a candidate with "value": null, "confidence": 1.0 and an appropriate "evidence".

The JSON should include the following top-level attributes:
- "is_student": whether the user is a student
- "student_info": nested fields:
  - "school": string
  - "major": string
  - "degree_level": string (e.g., Undergraduate, Master's, PhD)
- "occupation": user's job title or role
- "industry": user's work domain (e.g., finance, tech, education)
- "primary_language": language the user writes in; Simplified Chinese and Traditional Chinese are two different languages
- "gender": predicted gender

Please analyze the user data below and return a single valid JSON object following the format above.
"#;

pub const USER_CLUSTER_SYSTEM_PROMPT: &str = r#"
You are a classification expert. Your task is to categorize users into predefined high-level occupation and industry groups.

You will receive a JSON object with a user's occupation and industry. Assign the user to exactly one of the following occupation categories and one of the following industry categories.

### Occupation Categories:
- Data Analysis
- Student
- Teacher
- Designer
- Marketing
- Healthcare
- Tech Engineer
- Other

### Industry Categories:
- Technology & Software
- Education
- Healthcare
- Finance & Business Services
- Media & Design
- Government & Non-Profit
- Science & Research
- Manufacturing & Hardware
- Other

Respond with JSON only, like this:
{"occupation": "<one of the occupation categories>", "industry": "<one of the industry categories>"}
"#;

/// 聚类请求中的用户数据
pub fn cluster_prompt(occupation: &str, industry: &str) -> String {
    let payload = serde_json::json!({ "occupation": occupation, "industry": industry });
    format!("Here is the user data:\n{payload}\n")
}

/// 为单个用户构建描述文本
///
/// 段落顺序固定：基础画像、任务提示词、上传文件名、文件摘要。
/// 缺失字段不输出任何占位内容。
pub fn gen_prompt_for_user(user: &UserAggregate) -> String {
    let profile = profile_section(user);

    let tasks = bullet_section(
        user.tasks
            .iter()
            .filter(|task| !task.task_type.is_empty() && task.task_type != DOC_EXTRACTION_TASK_TYPE)
            .map(|task| task.prompt()),
    );
    let file_names = bullet_section(user.files.iter().map(|file| file.file_name.as_str()));
    let summaries = bullet_section(user.summaries.iter().map(String::as_str));

    format!(
        "## Input:\n\n\
         >User Base Profile:\n{profile}\n\
         >The prompts the user has entered (detect the primary_language from these prompts):\n{tasks}\n\
         >The names of the files the user uploaded:\n{file_names}\n\
         >Summaries of the files the user uploaded:\n{summaries}\n\
         Please reason carefully and return only the final JSON result, with no explanation or formatting outside the JSON.\n\n\
         Now, output the persona JSON:\n"
    )
}

fn profile_section(user: &UserAggregate) -> String {
    let mut lines = String::new();

    if let Some(analytics) = &user.analytics_user {
        push_line(&mut lines, "Name", &analytics.name);
        push_line(&mut lines, "Email", &analytics.email);
        push_line(&mut lines, "CountryCode", &analytics.country_code);
        push_line(&mut lines, "Region", &analytics.region);
        push_line(&mut lines, "City", &analytics.city);
        if analytics.is_education.eq_ignore_ascii_case("true") {
            lines.push_str("-IsEducation: True\n");
        }
    }

    if let Some(model) = &user.user_model {
        push_line(&mut lines, "GivenName", &model.given_name);
        push_line(&mut lines, "FamilyName", &model.family_name);
        push_line(&mut lines, "Fullname", &model.full_name);
        push_line(&mut lines, "SettingOutputLanguage", &model.output_language);
    }

    push_line(&mut lines, "The Describe of User's Avatar Image", user.avatar_info.trim());
    lines
}

fn push_line(lines: &mut String, label: &str, value: &str) {
    if !value.is_empty() {
        lines.push_str(&format!("-{label}: {value}\n"));
    }
}

fn bullet_section<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut section = String::new();
    for item in items.map(str::trim).filter(|item| !item.is_empty()) {
        let line = format!("- {}\n", truncate_on_char_boundary(item, ITEM_CHAR_BUDGET));
        if section.len() + line.len() > SECTION_CHAR_BUDGET {
            continue;
        }
        section.push_str(&line);
    }
    section
}

fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalyticsUser, FileModel, TaskMeta, TaskModel, UserModel};

    fn task(task_type: &str, prompt: &str) -> TaskModel {
        TaskModel {
            task_id: "1".to_string(),
            task_type: task_type.to_string(),
            task_meta: Some(TaskMeta {
                prompt: prompt.to_string(),
                file_ids: vec![],
            }),
        }
    }

    #[test]
    fn test_empty_user_has_no_placeholders() {
        let prompt = gen_prompt_for_user(&UserAggregate::default());
        assert!(!prompt.contains("-Name"));
        assert!(!prompt.contains("- "));
        assert!(prompt.contains(">User Base Profile:"));
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let user = UserAggregate {
            analytics_user: Some(AnalyticsUser {
                name: "Lin".to_string(),
                region: "Taipei".to_string(),
                is_education: "true".to_string(),
                ..Default::default()
            }),
            user_model: Some(UserModel {
                given_name: "Mei".to_string(),
                output_language: "zh-TW".to_string(),
                ..Default::default()
            }),
            avatar_info: "a cat wearing glasses".to_string(),
            tasks: vec![task("communication", "summarize my thesis draft")],
            files: vec![FileModel {
                file_name: "thesis.pdf".to_string(),
                ..Default::default()
            }],
            summaries: vec!["A thesis on marine biology".to_string()],
            ..Default::default()
        };

        let prompt = gen_prompt_for_user(&user);
        let name = prompt.find("-Name: Lin").unwrap();
        let given = prompt.find("-GivenName: Mei").unwrap();
        let avatar = prompt.find("a cat wearing glasses").unwrap();
        let task = prompt.find("- summarize my thesis draft").unwrap();
        let file = prompt.find("- thesis.pdf").unwrap();
        let summary = prompt.find("- A thesis on marine biology").unwrap();
        assert!(name < given && given < avatar && avatar < task);
        assert!(task < file && file < summary);
        assert!(prompt.contains("-IsEducation: True"));
        assert!(prompt.contains("-SettingOutputLanguage: zh-TW"));
    }

    #[test]
    fn test_non_signal_tasks_are_excluded() {
        let user = UserAggregate {
            tasks: vec![
                task("", "untyped task"),
                task(DOC_EXTRACTION_TASK_TYPE, "extract tables"),
                task("communication", "write a cover letter"),
                TaskModel {
                    task_id: "9".to_string(),
                    task_type: "communication".to_string(),
                    task_meta: None,
                },
            ],
            ..Default::default()
        };
        let prompt = gen_prompt_for_user(&user);
        assert!(!prompt.contains("untyped task"));
        assert!(!prompt.contains("extract tables"));
        assert!(prompt.contains("- write a cover letter"));
    }

    #[test]
    fn test_section_budget_bounds_length() {
        let user = UserAggregate {
            summaries: (0..10_000).map(|i| format!("summary number {i}")).collect(),
            ..Default::default()
        };
        let prompt = gen_prompt_for_user(&user);
        assert!(prompt.len() < SECTION_CHAR_BUDGET + 2_000);
        assert!(prompt.contains("- summary number 0\n"));
    }

    #[test]
    fn test_oversized_task_does_not_hide_later_tasks() {
        let long_prompt = "请帮我".repeat(5_000);
        let user = UserAggregate {
            tasks: vec![
                task("communication", &long_prompt),
                task("communication", "write a cover letter"),
            ],
            ..Default::default()
        };

        let prompt = gen_prompt_for_user(&user);
        assert!(prompt.contains("- write a cover letter\n"));
        // 超长条目按字符边界截断后保留
        let truncated = prompt
            .lines()
            .find(|line| line.starts_with("- 请帮我"))
            .unwrap();
        assert!(truncated.len() <= ITEM_CHAR_BUDGET + 2);
        assert!(truncated.len() > 2 + ITEM_CHAR_BUDGET - 3);
    }

    #[test]
    fn test_cluster_prompt_escapes_values() {
        let prompt = cluster_prompt("Data \"Scientist\"", "Tech");
        assert!(prompt.contains(r#""occupation":"Data \"Scientist\"""#));
    }
}
