//! Natural-language-to-scalar query pipeline.
//!
//! question → prompt → LLM → sanitizer → executor → text.
//!
//! A failed LLM call or an unusable completion falls back to the default
//! query so the user still gets a number. A statement the database refuses is
//! never papered over: the caller gets a `QueryExecutionError`.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::field::Empty;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::error::QueryExecutionError;
use crate::executor::ScalarExecutor;
use crate::llm::Translator;
use crate::prompt::build_prompt;
use crate::sanitizer::{sanitize, SanitizedSql};
use crate::schema::Schema;

/// Reply sent when the database refuses a statement. The cause is logged only.
pub const USER_ERROR_MESSAGE: &str = "⚠️ Произошла ошибка при обработке запроса.\n\n\
Возможные причины:\n\
• Некорректный формат запроса\n\
• Ошибка в работе с базой данных\n\
• Проблема с API анализатора\n\n\
Попробуйте переформулировать вопрос или используйте /help для примеров.";

pub const EXAMPLE_QUESTIONS: &[&str] = &[
    "Сколько всего видео есть в системе?",
    "Сколько видео у креатора с id abc123?",
    "Сколько видео набрало больше 100000 просмотров?",
    "На сколько просмотров выросли все видео 28 ноября 2025?",
];

pub struct QueryPipeline {
    translator: Arc<dyn Translator>,
    executor:   ScalarExecutor,
    schema:     &'static Schema,
}

impl QueryPipeline {
    pub fn new(translator: Arc<dyn Translator>, executor: ScalarExecutor, schema: &'static Schema) -> Self {
        Self { translator, executor, schema }
    }

    /// Question → one statement. Never fails: this is the single place where
    /// translation and extraction failures turn into the default query.
    pub async fn translate(&self, question: &str) -> SanitizedSql {
        info!("Text-to-SQL ({}): {}", self.translator.name(), question);
        let prompt = build_prompt(self.schema, question);

        let raw = match self.translator.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Translation failed, using default query: {}", e);
                return SanitizedSql::default_query();
            }
        };
        info!("Raw completion: {}", raw.trim());

        match sanitize(&raw) {
            Ok(sql) => {
                info!("Sanitized SQL: {}", sql);
                sql
            }
            Err(reason) => {
                warn!("No statement extracted ({}), using default query", reason);
                SanitizedSql::default_query()
            }
        }
    }

    /// Translate and execute, returning the scalar as text.
    ///
    /// Runs inside an `ask` span that records the question, the statement
    /// that was executed and the answer.
    pub async fn answer(&self, question: &str) -> Result<String, QueryExecutionError> {
        let span = info_span!("ask", question = %question, sql = Empty, answer = Empty);
        async {
            let sql = self.translate(question).await;
            Span::current().record("sql", sql.as_str());
            let value = self.executor.execute(&sql).await?;
            Span::current().record("answer", value.as_str());
            Ok::<_, QueryExecutionError>(value)
        }
        .instrument(span)
        .await
    }

    /// Answer for the chat layer: the scalar, or the fixed error message.
    pub async fn reply(&self, question: &str) -> String {
        match self.answer(question).await {
            Ok(value) => {
                info!("Answer: {}", value);
                value
            }
            Err(e) => {
                error!("Query execution failed: {}", e);
                USER_ERROR_MESSAGE.to_string()
            }
        }
    }

    pub fn executor(&self) -> &ScalarExecutor {
        &self.executor
    }

    pub fn translator_name(&self) -> String {
        self.translator.name()
    }

    /// Interactive loop: ask questions until "exit".
    pub async fn repl(&self) {
        println!();
        println!("╔════════════════════════════════════════════════════╗");
        println!("║   Video stats — question interface                 ║");
        println!("╠════════════════════════════════════════════════════╣");
        println!("║  Задайте вопрос на русском языке.                  ║");
        println!("║  Type 'exit' or Ctrl+C to quit.                    ║");
        println!("╠════════════════════════════════════════════════════╣");
        println!("  Примеры:");
        for q in EXAMPLE_QUESTIONS {
            println!("    • {}", q);
        }
        println!("╚════════════════════════════════════════════════════╝");
        println!();

        loop {
            print!("❯ ");
            io::stdout().flush().ok();

            let mut input = String::new();
            match io::stdin().read_line(&mut input) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let question = input.trim();

            if question.is_empty() { continue; }
            if question.eq_ignore_ascii_case("exit")
                || question.eq_ignore_ascii_case("quit")
                || question == "q" { break; }

            println!("{}", self.reply(question).await);
            println!();
        }
    }
}
