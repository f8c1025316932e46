use tokio::sync::mpsc;

use crate::client::{ApiError, ErrorKind};

/// Transient, non-blocking feedback for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Toast { kind: ErrorKind, message: String },
    /// Session is missing or expired; the UI redirects to the login page.
    LoginRequired,
}

pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, NoticeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Nobody listening is not an error.
    pub fn notify(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }

    /// Report a failed action, turning auth failures into a login redirect.
    pub fn failure(&self, error: &ApiError, message: String) {
        if error.kind() == ErrorKind::Auth {
            self.notify(Notice::LoginRequired);
        } else {
            self.notify(Notice::Toast {
                kind: error.kind(),
                message,
            });
        }
    }
}

pub fn move_failed_message(code: &str, error: &ApiError) -> String {
    match error {
        ApiError::NetworkUnreachable(_) => {
            format!("Could not reach the server. {} was moved back.", code)
        }
        ApiError::Timeout => format!(
            "The server took too long to respond. {} was moved back.",
            code
        ),
        ApiError::ServerRejected { message, .. } => match error.kind() {
            ErrorKind::Conflict => format!("{} cannot be placed there: {}", code, message),
            ErrorKind::Validation => format!("That slot is not valid for {}: {}", code, message),
            ErrorKind::NotFound => format!("{} is no longer in your schedule.", code),
            _ => format!("Moving {} failed: {}", code, message),
        },
        ApiError::Decode(_) | ApiError::Invalid(_) => {
            format!("Moving {} failed. Please try again.", code)
        }
    }
}

pub fn remove_failed_message(code: &str, error: &ApiError) -> String {
    match error.kind() {
        ErrorKind::Transient => format!("Could not reach the server. {} was kept.", code),
        ErrorKind::Forbidden => format!("You are not allowed to remove {}.", code),
        _ => format!("Removing {} failed: {}", code, error),
    }
}
