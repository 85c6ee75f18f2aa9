//! telegram.rs: Telegram chat front-end (Bot API long polling).
//!
//! Each text message is answered in its own task: the typing indicator goes
//! out, the question runs through the pipeline, and the scalar (or the fixed
//! error message) is sent back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::TelegramConfig;
use crate::error::TelegramError;
use crate::pipeline::QueryPipeline;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub const START_TEXT: &str = "Привет! Я бот для аналитики видео.\n\n\
Я могу ответить на вопросы о статистике видео, например:\n\
• Сколько всего видео в системе?\n\
• Сколько видео у креатора с id ...?\n\
• Сколько видео набрало больше N просмотров?\n\
• На сколько просмотров выросли видео за определённую дату?\n\n\
Просто задайте вопрос на русском языке!";

pub const HELP_TEXT: &str = "<b>Как пользоваться ботом:</b>\n\n\
Просто напишите вопрос на русском языке, например:\n\
• <code>Сколько всего видео есть в системе?</code>\n\
• <code>Сколько видео у креатора с id abc123?</code>\n\
• <code>Сколько видео набрало больше 100000 просмотров?</code>\n\
• <code>На сколько просмотров выросли все видео 28 ноября 2025?</code>\n\n\
Бот использует LLM, чтобы превратить вопрос в SQL-запрос к базе статистики.\n\n\
<b>Важно:</b> Бот возвращает только числовой ответ.";

/// Commands registered with setMyCommands.
pub const COMMANDS: &[(&str, &str)] = &[
    ("start", "Запустить бота"),
    ("help", "Помощь по использованию"),
];

// ─── Bot API types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

// ─── Message routing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Start,
    Help,
    Question(String),
    Ignore,
}

/// Route a message text. Empty texts and unknown commands are ignored.
pub fn classify(text: &str) -> Incoming {
    let text = text.trim();
    if text.is_empty() {
        return Incoming::Ignore;
    }
    let Some(command) = text.strip_prefix('/') else {
        return Incoming::Question(text.to_string());
    };

    // "/help@my_bot extra" → "help"
    let name = command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("");
    match name.to_lowercase().as_str() {
        "start" => Incoming::Start,
        "help" => Incoming::Help,
        _ => Incoming::Ignore,
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct TelegramClient {
    http: Client,
    base: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn from_config(cfg: &TelegramConfig) -> Result<Self, TelegramError> {
        let token = cfg.token.as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(TelegramError::NotConfigured)?;

        // Long polls must not hit the HTTP timeout first.
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            http,
            base: format!("{}/bot{}", cfg.api_base.trim_end_matches('/'), token.trim()),
            poll_timeout_secs: cfg.poll_timeout_secs,
        })
    }

    async fn call<T, B>(&self, method: &str, body: &B) -> Result<T, TelegramError>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize + ?Sized,
    {
        let resp: ApiResponse<T> = self.http
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        match resp {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, .. } => Err(TelegramError::Api(
                description.unwrap_or_else(|| format!("{} failed", method)),
            )),
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.poll(offset, self.poll_timeout_secs).await
    }

    /// Tell Telegram every update below `offset` was handled, without waiting.
    pub async fn confirm_updates(&self, offset: i64) -> Result<(), TelegramError> {
        self.poll(offset, 0).await.map(|_| ())
    }

    async fn poll(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessage { chat_id, text, parse_mode })
            .await?;
        Ok(())
    }

    pub async fn send_typing(&self, chat_id: i64) -> Result<(), TelegramError> {
        let _: bool = self
            .call("sendChatAction", &json!({ "chat_id": chat_id, "action": "typing" }))
            .await?;
        Ok(())
    }

    pub async fn set_my_commands(&self) -> Result<(), TelegramError> {
        let commands: Vec<_> = COMMANDS
            .iter()
            .map(|(command, description)| json!({ "command": command, "description": description }))
            .collect();
        let _: bool = self.call("setMyCommands", &json!({ "commands": commands })).await?;
        Ok(())
    }
}

// ─── Bot loop ────────────────────────────────────────────────────────────────

pub struct ChatBot {
    client:   Arc<TelegramClient>,
    pipeline: Arc<QueryPipeline>,
}

impl ChatBot {
    pub fn new(client: TelegramClient, pipeline: Arc<QueryPipeline>) -> Self {
        Self { client: Arc::new(client), pipeline }
    }

    /// Poll until `shutdown` resolves, then wait for in-flight answers.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        if let Err(e) = self.client.set_my_commands().await {
            warn!("setMyCommands failed: {}", e);
        }
        info!("Bot started, polling for updates");

        tokio::pin!(shutdown);
        let mut offset: i64 = 0;
        let mut tasks = JoinSet::new();

        loop {
            let updates = tokio::select! {
                _ = &mut shutdown => break,
                updates = self.client.get_updates(offset) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            let client = Arc::clone(&self.client);
                            let pipeline = Arc::clone(&self.pipeline);
                            tasks.spawn(async move { handle_message(&client, &pipeline, message).await });
                        }
                    }
                }
                Err(e) => {
                    warn!("getUpdates failed: {}; retrying in {:?}", e, RETRY_DELAY);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }

            // Reap finished handlers so the set does not grow unbounded.
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Message handler panicked: {}", e);
                }
            }
        }

        info!("Stopping bot, waiting for {} in-flight message(s)", tasks.len());
        while tasks.join_next().await.is_some() {}

        // Otherwise the last batch is delivered again after a restart.
        if offset > 0 {
            if let Err(e) = self.client.confirm_updates(offset).await {
                warn!("Failed to confirm updates up to {}: {}", offset, e);
            }
        }
    }
}

async fn handle_message(client: &TelegramClient, pipeline: &QueryPipeline, message: Message) {
    let chat_id = message.chat.id;
    let Some(text) = message.text.as_deref() else {
        return;
    };

    let result = match classify(text) {
        Incoming::Ignore => return,
        Incoming::Start => client.send_message(chat_id, START_TEXT, None).await,
        Incoming::Help => client.send_message(chat_id, HELP_TEXT, Some("HTML")).await,
        Incoming::Question(question) => {
            let from = message.from.as_ref().map(|u| u.id).unwrap_or_default();
            info!("Question from {}: {}", from, question);
            if let Err(e) = client.send_typing(chat_id).await {
                warn!("sendChatAction failed: {}", e);
            }
            let reply = pipeline.reply(&question).await;
            client.send_message(chat_id, &reply, None).await
        }
    };

    if let Err(e) = result {
        error!("Failed to reply to chat {}: {}", chat_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_commands() {
        assert_eq!(classify("/start"), Incoming::Start);
        assert_eq!(classify("  /help  "), Incoming::Help);
        assert_eq!(classify("/HELP@video_stats_bot"), Incoming::Help);
        assert_eq!(classify("/start payload"), Incoming::Start);
        assert_eq!(classify("/stats"), Incoming::Ignore);
        assert_eq!(classify("/"), Incoming::Ignore);
    }

    #[test]
    fn test_classify_questions() {
        assert_eq!(classify("   "), Incoming::Ignore);
        assert_eq!(
            classify(" Сколько всего видео есть в системе? "),
            Incoming::Question("Сколько всего видео есть в системе?".into())
        );
    }

    #[test]
    fn test_parse_updates() {
        let body = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"from":{"id":7,"is_bot":false,"first_name":"A"},"date":0,"text":"hi"}},
            {"update_id":11,"edited_message":{"message_id":2,"chat":{"id":42},"date":0}}
        ]}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        assert!(resp.ok);
        let updates = resp.result.unwrap();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.chat.id, 42);
        assert_eq!(msg.text.as_deref(), Some("hi"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_api_error_shape() {
        let body = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_send_message_omits_empty_parse_mode() {
        let json = serde_json::to_value(SendMessage { chat_id: 1, text: "5", parse_mode: None }).unwrap();
        assert!(json.get("parse_mode").is_none());
    }

    mod fake_api {
        use std::sync::{Arc, Mutex};

        use serde_json::{json, Value};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio::sync::Notify;

        pub type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

        /// Minimal Bot API: the first poll returns one update, the next
        /// long poll hangs (and signals `parked`), zero-timeout polls and
        /// every other method succeed.
        pub async fn serve(listener: TcpListener, log: CallLog, parked: Arc<Notify>) {
            while let Ok((sock, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                let parked = Arc::clone(&parked);
                tokio::spawn(async move { handle(sock, log, parked).await });
            }
        }

        async fn handle(mut sock: TcpStream, log: CallLog, parked: Arc<Notify>) {
            let (method, body) = read_request(&mut sock).await;
            let polls = {
                let mut log = log.lock().unwrap();
                log.push((method.clone(), body.clone()));
                log.iter().filter(|(m, _)| m == "getUpdates").count()
            };

            let reply = match method.as_str() {
                "getUpdates" if polls == 1 => json!({ "ok": true, "result": [
                    { "update_id": 10, "message": { "message_id": 1, "chat": { "id": 5 }, "text": "/unknown" } }
                ]}),
                "getUpdates" if body["timeout"] == 0 => json!({ "ok": true, "result": [] }),
                "getUpdates" => {
                    parked.notify_one();
                    std::future::pending::<Value>().await
                }
                _ => json!({ "ok": true, "result": true }),
            };

            let payload = reply.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            sock.write_all(response.as_bytes()).await.unwrap();
        }

        async fn read_request(sock: &mut TcpStream) -> (String, Value) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = sock.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let length = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            while buf.len() < header_end + length {
                let n = sock.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body");
                buf.extend_from_slice(&chunk[..n]);
            }

            let path = head.split_whitespace().nth(1).unwrap_or_default();
            let method = path.rsplit('/').next().unwrap_or_default().to_string();
            let body = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap_or(Value::Null);
            (method, body)
        }
    }

    struct NeverAsked;

    #[async_trait::async_trait]
    impl crate::llm::Translator for NeverAsked {
        async fn complete(&self, _: &crate::prompt::ChatPrompt) -> Result<String, crate::error::TranslationError> {
            Err(crate::error::TranslationError::NotConfigured)
        }

        fn name(&self) -> String {
            "none".into()
        }
    }

    #[tokio::test]
    async fn test_shutdown_confirms_handled_updates() {
        use std::sync::Mutex;

        use crate::db::{Database, PoolOptions};
        use crate::executor::ScalarExecutor;
        use crate::schema::SCHEMA;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log: fake_api::CallLog = Arc::new(Mutex::new(Vec::new()));
        let parked = Arc::new(tokio::sync::Notify::new());
        tokio::spawn(fake_api::serve(listener, Arc::clone(&log), Arc::clone(&parked)));

        let client = TelegramClient {
            http: Client::new(),
            base: format!("http://{addr}/bottest"),
            poll_timeout_secs: 30,
        };
        let db = Arc::new(Database::new(PoolOptions::new(":memory:")));
        let pipeline = Arc::new(QueryPipeline::new(Arc::new(NeverAsked), ScalarExecutor::new(db), &SCHEMA));
        let bot = ChatBot::new(client, pipeline);

        let stop = Arc::clone(&parked);
        tokio::time::timeout(Duration::from_secs(10), bot.run(async move { stop.notified().await }))
            .await
            .expect("bot stops once the second poll is parked");

        let log = log.lock().unwrap();
        let polls: Vec<_> = log.iter().filter(|(m, _)| m == "getUpdates").map(|(_, b)| b.clone()).collect();
        assert_eq!(polls.len(), 3, "{polls:?}");
        assert_eq!(polls[0]["offset"], 0);
        assert_eq!(polls[1]["offset"], 11);
        assert_eq!(polls[2]["offset"], 11);
        assert_eq!(polls[2]["timeout"], 0);
        assert!(log.iter().all(|(m, _)| m != "sendMessage"));
    }

    #[test]
    fn test_client_requires_token() {
        let cfg = TelegramConfig::default();
        assert!(matches!(TelegramClient::from_config(&cfg), Err(TelegramError::NotConfigured)));

        let cfg = TelegramConfig { token: Some("123:abc".into()), ..TelegramConfig::default() };
        let client = TelegramClient::from_config(&cfg).unwrap();
        assert_eq!(client.base, "https://api.telegram.org/bot123:abc");
    }
}
