use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::MailConfig;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

pub fn welcome(email: &str, name: &str) -> Email {
    Email {
        to: email.to_string(),
        subject: "Thanks for joining TaskManagr".into(),
        text: format!(
            "Welcome {name}, thanks for joining TaskManagr.\n\n\
             Let us know how you get along with the app."
        ),
    }
}

pub fn goodbye(email: &str, name: &str) -> Email {
    Email {
        to: email.to_string(),
        subject: "We Hate To See You Go".into(),
        text: format!(
            "We hate to see you go {name}. Is there any reason for deleting your TaskManagr account?\n\
             Please let us know how we can do better."
        ),
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Hands the message to a background task. Delivery failures are logged, never returned.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        match mailer.send(&email).await {
            Ok(()) => debug!(subject = %email.subject, "mail sent"),
            Err(e) => warn!(error = %e, subject = %email.subject, "mail delivery failed"),
        }
    });
}

pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(cfg: &MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: cfg.sendgrid_api_key.clone(),
            from: cfg.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": self.from },
            "subject": email.subject,
            "content": [{ "type": "text/plain", "value": email.text }],
        });
        self.client
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("sendgrid request")?
            .error_for_status()
            .context("sendgrid rejected message")?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<Email>>,
    }

    impl RecordingMailer {
        pub fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|e| e.subject.clone()).collect()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &Email) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    mockall::mock! {
        pub Mail {}

        #[async_trait]
        impl Mailer for Mail {
            async fn send(&self, email: &Email) -> anyhow::Result<()>;
        }
    }

    /// A provider that refuses exactly `sends` messages.
    pub fn failing_mailer(sends: usize) -> MockMail {
        let mut mailer = MockMail::new();
        mailer
            .expect_send()
            .times(sends)
            .returning(|_| Err(anyhow::anyhow!("mail provider unavailable")));
        mailer
    }

    /// Lets spawned dispatch tasks run on the current-thread test runtime.
    pub async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn templates_address_the_user_by_name() {
        let w = welcome("ada@x.com", "Ada");
        assert_eq!(w.to, "ada@x.com");
        assert!(w.text.contains("Welcome Ada"));
        let g = goodbye("ada@x.com", "Ada");
        assert_eq!(g.subject, "We Hate To See You Go");
        assert!(g.text.contains("Ada"));
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let mailer = Arc::new(RecordingMailer::default());
        dispatch(mailer.clone(), welcome("ada@x.com", "Ada"));
        settle().await;
        assert_eq!(mailer.subjects(), vec!["Thanks for joining TaskManagr".to_string()]);
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        let mut mailer = MockMail::new();
        mailer
            .expect_send()
            .withf(|email| email.subject == "We Hate To See You Go" && email.to == "ada@x.com")
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("mail provider unavailable")));

        dispatch(Arc::new(mailer), goodbye("ada@x.com", "Ada"));
        settle().await;
    }
}
