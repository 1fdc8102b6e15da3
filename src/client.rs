use colored::Colorize;
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use crate::{config::Config, error::ChatError};

pub const NO_RESPONSE: &str = "No response.";

/// Remote side of the conversation. One attempt per call, no retries.
pub trait ChatBackend {
    fn send_message(&self, text: &str) -> Result<String, ChatError>;
    fn reset_conversation(&self) -> Result<(), ChatError>;
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: Option<String>,
}

pub struct HttpChatClient {
    client: Client,
    api_addr: String,
    debug: bool,
}

impl HttpChatClient {
    pub fn new(config: &Config) -> Result<Self, ChatError> {
        Ok(Self {
            client: Client::builder().build().map_err(ChatError::Transport)?,
            api_addr: config.api_addr.trim_end_matches('/').to_string(),
            debug: config.debug,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_addr, path)
    }
}

impl ChatBackend for HttpChatClient {
    fn send_message(&self, text: &str) -> Result<String, ChatError> {
        let url = self.endpoint("chat");
        let body = serde_json::json!({ "message": text });

        if self.debug {
            println!("{}", format!("[API request] POST {}\n{}", url, body).truecolor(128, 128, 128));
        }
        debug!("POST {}", url);

        let res = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()?;

        if !res.status().is_success() {
            return Err(ChatError::Status(res.status().as_u16()));
        }

        let reply: ChatReply = res.json().map_err(ChatError::Decode)?;
        if self.debug {
            println!("{}", format!("[API response] {:?}", reply.response).truecolor(128, 128, 128));
        }
        Ok(reply.response.unwrap_or_else(|| NO_RESPONSE.to_string()))
    }

    fn reset_conversation(&self) -> Result<(), ChatError> {
        let url = self.endpoint("reset");
        debug!("POST {}", url);

        let res = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .send()?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(ChatError::Status(res.status().as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = Config { api_addr: "http://localhost:5000/".to_string(), ..Config::default() };
        let client = HttpChatClient::new(&config).unwrap();
        assert_eq!(client.endpoint("chat"), "http://localhost:5000/chat");
    }

    #[test]
    fn missing_response_field_decodes_to_none() {
        let reply: ChatReply = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        assert!(reply.response.is_none());
        let reply: ChatReply = serde_json::from_str(r#"{"response": null}"#).unwrap();
        assert!(reply.response.is_none());
    }
}
