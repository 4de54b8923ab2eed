//! Registration form submission.
//!
//! Sends the serialized registration form to its action URL in a single
//! asynchronous POST and reflects the JSON answer on the page:
//!
//! | Answer              | Page update                                               |
//! |---------------------|-----------------------------------------------------------|
//! | `result == 1`       | navigate to `/`                                           |
//! | `result != 1`       | token field ← server token, message ← server error if any  |
//! | transport failure   | blocking notification with the error description         |
//!
//! There is no retry; the returned token lets the user submit again.

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::page::{MessageState, Page};
use crate::protocol::{decode_response, FormFields, RegistrationResponse};
use crate::transport::{resolve_url, Transport};

/// Where the page goes after a successful registration.
pub const SITE_ROOT: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Registered; the page navigated to the site root.
    Accepted,
    /// Refused; `token` was written back for a retry and `error` shown inline.
    Rejected { token: String, error: String },
}

pub struct RegistrationSubmitter<T> {
    transport: T,
    base_url: Url,
}

impl<T: Transport> RegistrationSubmitter<T> {
    /// `base_url` resolves relative form actions.
    pub fn new(transport: T, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit `form` to `action` and update `page` with the answer.
    pub async fn submit<P: Page>(
        &self,
        page: &mut P,
        action: &str,
        form: &FormFields,
    ) -> Result<RegistrationOutcome> {
        let response = match self.send(action, form).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "registration request failed");
                page.notify(&e.to_string());
                return Err(e);
            }
        };

        if response.result.is_success() {
            info!("registration accepted");
            page.navigate(SITE_ROOT);
            return Ok(RegistrationOutcome::Accepted);
        }

        let token = response.token.unwrap_or_default();
        debug!(result = %response.result, error = ?response.error, "registration rejected");
        page.set_token(&token);
        // Without an error text the message region keeps its current content
        if let Some(error) = &response.error {
            page.show_message(error, MessageState::Error);
        }
        Ok(RegistrationOutcome::Rejected {
            token,
            error: response.error.unwrap_or_default(),
        })
    }

    async fn send(&self, action: &str, form: &FormFields) -> Result<RegistrationResponse> {
        let url = resolve_url(&self.base_url, action)?;
        debug!(%url, "submitting registration form");
        let body = self.transport.post_form(&url, form).await?;
        decode_response(&body)
    }
}
