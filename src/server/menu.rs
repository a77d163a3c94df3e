// ABOUTME: Plain-text directory menu shown on the inbound terminal.
// ABOUTME: Numbered endpoint list with line editing; returns the chosen endpoint.

use crate::config::Endpoint;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MENU_TITLE: &str = "Directory Listing";

/// A single keypress at the menu prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKey {
    Digit(u8),
    Erase,
    Submit,
    Quit,
    Ignored,
}

impl MenuKey {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0'..=b'9' => MenuKey::Digit(byte - b'0'),
            0x08 | 0x7f => MenuKey::Erase,
            b'\r' | b'\n' => MenuKey::Submit,
            b'q' | b'Q' | 0x03 | 0x04 => MenuKey::Quit,
            _ => MenuKey::Ignored,
        }
    }
}

/// Render the directory listing.
pub fn render(endpoints: &[Endpoint]) -> String {
    let width = endpoints
        .iter()
        .map(|e| e.name.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = format!("{}\r\n\r\n", MENU_TITLE);
    for (i, endpoint) in endpoints.iter().enumerate() {
        out.push_str(&format!(
            "  {:>2}) {:<width$}  ssh://{}\r\n",
            i + 1,
            endpoint.name.as_str(),
            endpoint.address,
            width = width
        ));
    }
    out
}

const PROMPT: &str = "\r\nSelect an endpoint (q to quit): ";

/// The chosen endpoint and whatever was typed after the Enter key.
#[derive(Debug, Clone)]
pub struct Selection {
    pub endpoint: Endpoint,
    /// Input already read past the selection. It belongs to the remote shell.
    pub typed_ahead: Vec<u8>,
}

/// Show the menu and read a selection from `input`.
///
/// `Ok(None)` when the user quits or the input ends.
pub async fn pick_endpoint<R, W>(
    endpoints: &[Endpoint],
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<Selection>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(render(endpoints).as_bytes()).await?;
    output.write_all(PROMPT.as_bytes()).await?;

    let mut selection = String::new();
    let mut last_was_cr = false;
    let mut buf = [0u8; 64];

    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }

        for (i, &byte) in buf[..n].iter().enumerate() {
            // "\r\n" is one Enter.
            let after_cr = last_was_cr;
            last_was_cr = byte == b'\r';
            if byte == b'\n' && after_cr {
                continue;
            }

            match MenuKey::from_byte(byte) {
                MenuKey::Digit(d) => {
                    selection.push(char::from(b'0' + d));
                    output.write_all(&[byte]).await?;
                }
                MenuKey::Erase => {
                    if selection.pop().is_some() {
                        output.write_all(b"\x08 \x08").await?;
                    }
                }
                MenuKey::Submit => {
                    let chosen = selection
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|i| endpoints.get(i));
                    if let Some(endpoint) = chosen {
                        output.write_all(b"\r\n").await?;
                        let mut rest = &buf[i + 1..n];
                        if byte == b'\r' && rest.first() == Some(&b'\n') {
                            rest = &rest[1..];
                        }
                        return Ok(Some(Selection {
                            endpoint: endpoint.clone(),
                            typed_ahead: rest.to_vec(),
                        }));
                    }
                    if !selection.is_empty() {
                        output.write_all(b"\r\nInvalid selection").await?;
                    }
                    selection.clear();
                    output.write_all(PROMPT.as_bytes()).await?;
                }
                MenuKey::Quit => {
                    output.write_all(b"\r\n").await?;
                    return Ok(None);
                }
                MenuKey::Ignored => {}
            }
        }
        output.flush().await?;
    }
}
