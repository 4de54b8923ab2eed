//! Page Surface Module
//!
//! Everything the flows show to the user goes through the [`Page`] trait: the
//! hidden token field, the inline message region, the status region, the
//! enrollment trigger, blocking notifications, navigation, the export password
//! prompt and the bundle download.
//!
//! Two surfaces ship with the crate:
//! - [`HeadlessPage`]: keeps every update in memory, for embedding and tests
//! - [`ConsolePage`]: renders to the terminal and writes downloads to disk

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use base64::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

/// Visual state of a message or status region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Success,
    Error,
}

impl MessageState {
    /// CSS class the region carries in the web page.
    pub fn css_class(&self) -> &'static str {
        match self {
            MessageState::Success => "alert-success",
            MessageState::Error => "alert-danger",
        }
    }
}

/// A file offered to the user, base64-encoded as in a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub base64: String,
}

impl Download {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.base64)
    }
}

/// The user-facing surface the flows write to.
pub trait Page {
    /// Replace the value of the hidden token field.
    fn set_token(&mut self, token: &str);

    /// Inline message region of the registration form.
    fn show_message(&mut self, text: &str, state: MessageState);

    /// Status (title) region of the enrollment page.
    fn set_status(&mut self, text: &str, state: MessageState);

    fn set_trigger_enabled(&mut self, enabled: bool);

    /// Blocking notification.
    fn notify(&mut self, text: &str);

    fn navigate(&mut self, location: &str);

    /// Ask for the bundle export password. `None` when the prompt is dismissed.
    fn prompt_password(&mut self, prompt: &str) -> Option<SecretString>;

    fn deliver_download(&mut self, download: &Download) -> io::Result<()>;
}

/// In-memory page that records every update.
#[derive(Debug)]
pub struct HeadlessPage {
    pub token: String,
    pub message: Option<(String, MessageState)>,
    pub status: Option<(String, MessageState)>,
    pub trigger_enabled: bool,
    pub notifications: Vec<String>,
    pub navigations: Vec<String>,
    pub downloads: Vec<Download>,
    pub prompts: usize,
    password: Option<SecretString>,
}

impl HeadlessPage {
    /// A page whose password prompt is always dismissed.
    pub fn new() -> Self {
        Self {
            token: String::new(),
            message: None,
            status: None,
            trigger_enabled: true,
            notifications: Vec::new(),
            navigations: Vec::new(),
            downloads: Vec::new(),
            prompts: 0,
            password: None,
        }
    }

    /// A page answering every password prompt with `password`.
    pub fn with_password(password: &str) -> Self {
        Self {
            password: Some(SecretString::from(password.to_string())),
            ..Self::new()
        }
    }
}

impl Default for HeadlessPage {
    fn default() -> Self {
        Self::new()
    }
}

impl Page for HeadlessPage {
    fn set_token(&mut self, token: &str) {
        self.token = token.to_string();
    }

    fn show_message(&mut self, text: &str, state: MessageState) {
        self.message = Some((text.to_string(), state));
    }

    fn set_status(&mut self, text: &str, state: MessageState) {
        self.status = Some((text.to_string(), state));
    }

    fn set_trigger_enabled(&mut self, enabled: bool) {
        self.trigger_enabled = enabled;
    }

    fn notify(&mut self, text: &str) {
        self.notifications.push(text.to_string());
    }

    fn navigate(&mut self, location: &str) {
        self.navigations.push(location.to_string());
    }

    fn prompt_password(&mut self, _prompt: &str) -> Option<SecretString> {
        self.prompts += 1;
        self.password
            .as_ref()
            .map(|p| SecretString::from(p.expose_secret().to_string()))
    }

    fn deliver_download(&mut self, download: &Download) -> io::Result<()> {
        self.downloads.push(download.clone());
        Ok(())
    }
}

/// Terminal page used by the command-line client.
///
/// Downloads are decoded and written to `output`; when `output` is an existing
/// directory the download's file name is appended.
pub struct ConsolePage {
    output: PathBuf,
    print_data_url: bool,
}

impl ConsolePage {
    pub fn new(output: PathBuf) -> Self {
        Self {
            output,
            print_data_url: false,
        }
    }

    pub fn print_data_url(mut self, enabled: bool) -> Self {
        self.print_data_url = enabled;
        self
    }

    fn target_path(&self, download: &Download) -> PathBuf {
        if self.output.is_dir() {
            self.output.join(&download.file_name)
        } else {
            self.output.clone()
        }
    }
}

impl Page for ConsolePage {
    fn set_token(&mut self, token: &str) {
        println!("Token: {}", token);
    }

    fn show_message(&mut self, text: &str, state: MessageState) {
        match state {
            MessageState::Success => println!("✓ {}", text),
            MessageState::Error => eprintln!("✗ {}", text),
        }
    }

    fn set_status(&mut self, text: &str, state: MessageState) {
        self.show_message(text, state);
    }

    fn set_trigger_enabled(&mut self, enabled: bool) {
        debug!(enabled, "enrollment trigger");
    }

    fn notify(&mut self, text: &str) {
        eprintln!("\n⚠️  {}\n", text);
    }

    fn navigate(&mut self, location: &str) {
        info!(location, "redirect");
        println!("→ Continue at {}", location);
    }

    fn prompt_password(&mut self, prompt: &str) -> Option<SecretString> {
        print!("{}: ", prompt);
        io::stdout().flush().ok()?;
        rpassword::read_password().ok().map(SecretString::from)
    }

    fn deliver_download(&mut self, download: &Download) -> io::Result<()> {
        let bytes = download
            .decode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let path = self.target_path(download);
        fs::write(&path, bytes)?;
        println!("✓ {} saved to {}", download.file_name, path.display());
        if self.print_data_url {
            println!("{}", download.data_url());
        }
        Ok(())
    }
}
