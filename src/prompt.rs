//! prompt.rs: System prompt for text-to-SQL generation.
//!
//! Constrains LLM output to a single SQLite statement that reduces to one
//! scalar. The rules here are the contract the sanitizer relies on.

use crate::schema::Schema;

/// Worked question → SQL pairs shown to the model.
pub const EXAMPLES: &[(&str, &str)] = &[
    (
        "Сколько всего видео есть в системе?",
        "SELECT COUNT(*) FROM videos;",
    ),
    (
        "Сколько видео у креатора с id aca1061a9d324ecf8c3fa2bb32d7be63 вышло с 1 ноября 2025 по 5 ноября 2025 включительно?",
        "SELECT COUNT(*) FROM videos WHERE creator_id = 'aca1061a9d324ecf8c3fa2bb32d7be63' AND DATE(video_created_at) BETWEEN '2025-11-01' AND '2025-11-05';",
    ),
    (
        "Сколько видео набрало больше 100000 просмотров за всё время?",
        "SELECT COUNT(*) FROM videos WHERE views_count > 100000;",
    ),
    (
        "На сколько просмотров в сумме выросли все видео 28 ноября 2025?",
        "SELECT COALESCE(SUM(delta_views_count), 0) FROM video_snapshots WHERE DATE(created_at) = '2025-11-28';",
    ),
    (
        "Сколько разных видео получали новые просмотры 27 ноября 2025?",
        "SELECT COUNT(DISTINCT video_id) FROM video_snapshots WHERE DATE(created_at) = '2025-11-27' AND delta_views_count > 0;",
    ),
    (
        "Сколько видео получило новые лайки 26 ноября 2025?",
        "SELECT COUNT(DISTINCT video_id) FROM video_snapshots WHERE DATE(created_at) = '2025-11-26' AND delta_likes_count > 0;",
    ),
    (
        "На сколько выросли просмотры видео креатора cd87be38b50b4fdd8342bb3c383f3c7d 28 ноября 2025 с 10:00 до 15:00?",
        "SELECT COALESCE(SUM(s.delta_views_count), 0) FROM video_snapshots s JOIN videos v ON v.id = s.video_id WHERE v.creator_id = 'cd87be38b50b4fdd8342bb3c383f3c7d' AND s.created_at >= '2025-11-28 10:00:00' AND s.created_at < '2025-11-28 15:00:00';",
    ),
    (
        "How many snapshots recorded a negative change in views?",
        "SELECT COUNT(*) FROM video_snapshots WHERE delta_views_count < 0;",
    ),
];

/// A system turn plus the verbatim user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

/// Compose the two-turn prompt for `question`. Pure: no I/O.
pub fn build_prompt(schema: &Schema, question: &str) -> ChatPrompt {
    ChatPrompt {
        system: build_system_prompt(schema),
        user: question.to_string(),
    }
}

pub fn build_system_prompt(schema: &Schema) -> String {
    let examples = EXAMPLES
        .iter()
        .map(|(question, sql)| format!("Question: \"{question}\"\n{sql}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an experienced SQL analyst for a video statistics service.

Convert the user's question (usually in Russian) into ONE SQLite query whose result is exactly one number.

SCHEMA:
{schema}
RULES:
- Output ONLY the SQL query, nothing else
- Never prefix the query with "SQL:", "Query:", "Запрос:", "Ответ:" or any explanation
- No markdown, no backticks, no comments after the query
- The query must return ONE value: use COUNT(*), SUM(...), COUNT(DISTINCT ...)
- Wrap SUM(...) in COALESCE(SUM(...), 0) so an empty set yields 0
- Dates are written as 'YYYY-MM-DD'
- For a whole day compare DATE(column) = 'YYYY-MM-DD'
- For a time range use half-open bounds on the full timestamp: column >= 'YYYY-MM-DD HH:MM:SS' AND column < 'YYYY-MM-DD HH:MM:SS'
- Timestamps are stored in UTC as 'YYYY-MM-DD HH:MM:SS'
- creator_id is a string: always wrap it in single quotes
- video_snapshots has no creator_id: for questions about a creator's snapshots JOIN videos ON videos.id = video_snapshots.video_id
- Growth / increase / "выросли" / "новые" questions use the delta_* columns of video_snapshots
- Totals "за всё время" use the *_count columns of videos
- Never use LIMIT, the answer must be exact
- Use only tables and columns from the schema

EXAMPLES:

{examples}"#,
        schema = schema.describe(),
        examples = examples,
    )
}
