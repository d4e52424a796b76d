//! SMTP mail transport
//!
//! Speaks the SMTP submission dialogue over a per-call TCP connection:
//! greeting, EHLO, optional STARTTLS upgrade, AUTH PLAIN, then the
//! MAIL/RCPT/DATA exchange. The connection lives for exactly one `deliver`
//! call and is dropped on every exit path.
//!
//! Reply-code mapping drives the dispatcher's retry behavior: 4xx replies
//! and connect failures are transient, 535-class replies mean the
//! configured credentials were rejected (Gmail accounts need an
//! app-specific password), and other 5xx replies are permanent rejections.

use super::transport::{MailTransport, OutboundMail, TransportError};
use crate::config::MailConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

/// SMTP transport configured from `MailConfig`
pub struct SmtpTransport {
    config: MailConfig,
    tls: TlsConnector,
}

impl SmtpTransport {
    pub fn new(config: MailConfig) -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    async fn session(&self, mail: &OutboundMail) -> Result<(), TransportError> {
        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let mut stream = BufStream::new(tcp);

        expect_reply(&mut stream, 220).await?;
        send_command(&mut stream, &format!("EHLO {}", self.config.helo()), 250).await?;

        if self.config.use_tls {
            send_command(&mut stream, "STARTTLS", 220).await?;

            let tcp = stream.into_inner();
            let name = rustls::pki_types::ServerName::try_from(self.config.host.clone())
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            let tls_stream = self
                .tls
                .connect(name, tcp)
                .await
                .map_err(|e| TransportError::Tls(e.to_string()))?;

            let mut stream = BufStream::new(tls_stream);
            send_command(&mut stream, &format!("EHLO {}", self.config.helo()), 250).await?;
            self.transact(&mut stream, mail).await
        } else {
            self.transact(&mut stream, mail).await
        }
    }

    /// AUTH + MAIL/RCPT/DATA on an established (possibly upgraded) stream
    async fn transact<S>(
        &self,
        stream: &mut BufStream<S>,
        mail: &OutboundMail,
    ) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            let token = BASE64.encode(format!("\0{user}\0{pass}"));
            write_line(stream, &format!("AUTH PLAIN {token}")).await?;
            let reply = read_reply(stream).await?;
            if reply.code != 235 {
                return Err(TransportError::AuthRejected(reply.text()));
            }
        }

        send_command(stream, &format!("MAIL FROM:<{}>", mail.from), 250).await?;
        send_command(stream, &format!("RCPT TO:<{}>", mail.to), 250).await?;
        send_command(stream, "DATA", 354).await?;

        let body = dot_stuff(&format_message(mail));
        stream.write_all(body.as_bytes()).await?;
        stream.write_all(b"\r\n.\r\n").await?;
        stream.flush().await?;
        let reply = read_reply(stream).await?;
        if reply.code / 100 != 2 {
            return Err(classify(&reply));
        }

        // The message is accepted at this point; a failed QUIT is harmless
        let _ = write_line(stream, "QUIT").await;
        Ok(())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, mail: &OutboundMail) -> Result<(), TransportError> {
        match timeout(self.config.timeout(), self.session(mail)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// A parsed SMTP reply (multiline replies collapsed)
#[derive(Debug)]
struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    fn text(&self) -> String {
        self.lines.join(" ")
    }
}

fn classify(reply: &Reply) -> TransportError {
    match reply.code {
        530 | 534 | 535 | 538 => TransportError::AuthRejected(reply.text()),
        400..=499 => TransportError::Transient {
            code: reply.code,
            message: reply.text(),
        },
        500..=599 => TransportError::Rejected {
            code: reply.code,
            message: reply.text(),
        },
        other => TransportError::Protocol(format!("unexpected reply {}: {}", other, reply.text())),
    }
}

async fn write_line<S>(stream: &mut BufStream<S>, line: &str) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

async fn read_reply<S>(stream: &mut BufStream<S>) -> Result<Reply, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut lines = Vec::new();
    let mut code = 0u16;

    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(TransportError::Protocol(
                "connection closed mid-reply".to_string(),
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 3 {
            return Err(TransportError::Protocol(format!("malformed reply '{line}'")));
        }

        code = line[..3]
            .parse()
            .map_err(|_| TransportError::Protocol(format!("malformed reply code '{line}'")))?;
        lines.push(line.get(4..).unwrap_or("").to_string());

        // "250-..." continues, "250 ..." (or bare "250") ends the reply
        if line.as_bytes().get(3) != Some(&b'-') {
            break;
        }
    }

    Ok(Reply { code, lines })
}

async fn send_command<S>(
    stream: &mut BufStream<S>,
    line: &str,
    expected: u16,
) -> Result<Reply, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    write_line(stream, line).await?;
    expect_reply(stream, expected).await
}

async fn expect_reply<S>(stream: &mut BufStream<S>, expected: u16) -> Result<Reply, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let reply = read_reply(stream).await?;
    if reply.code / 100 == expected / 100 {
        Ok(reply)
    } else {
        Err(classify(&reply))
    }
}

/// RFC 5322 message with a multipart/alternative body
fn format_message(mail: &OutboundMail) -> String {
    let boundary = "=_aeromed_alt";
    format!(
        "From: <{from}>\r\n\
         To: <{to}>\r\n\
         Subject: {subject}\r\n\
         Date: {date}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {text}\r\n\
         --{boundary}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         \r\n\
         {html}\r\n\
         --{boundary}--",
        from = mail.from,
        to = mail.to,
        subject = mail.subject,
        date = Utc::now().to_rfc2822(),
        text = mail.text,
        html = mail.html,
    )
}

/// Double leading dots so body lines cannot terminate the DATA section
fn dot_stuff(body: &str) -> String {
    body.split('\n')
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EmailAddress;
    use tokio::io::AsyncReadExt;

    fn sample_mail() -> OutboundMail {
        OutboundMail {
            from: EmailAddress::new("no-reply@aeromed.example").unwrap(),
            to: EmailAddress::new("amara@example.sl").unwrap(),
            subject: "Delivery Request Confirmed - Aeromed #1".into(),
            text: "Dear Amara,\n\nYour request was received.".into(),
            html: "<p>Dear Amara,</p>".into(),
        }
    }

    #[test]
    fn test_dot_stuffing() {
        assert_eq!(dot_stuff("hello\n.world\n..x"), "hello\n..world\n...x");
        assert_eq!(dot_stuff("no dots"), "no dots");
    }

    #[test]
    fn test_format_message_headers_and_parts() {
        let message = format_message(&sample_mail());
        assert!(message.starts_with("From: <no-reply@aeromed.example>\r\n"));
        assert!(message.contains("To: <amara@example.sl>"));
        assert!(message.contains("Subject: Delivery Request Confirmed - Aeromed #1"));
        assert!(message.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(message.contains("Content-Type: text/html; charset=utf-8"));
        assert!(message.trim_end().ends_with("--=_aeromed_alt--"));
    }

    #[tokio::test]
    async fn test_read_reply_multiline() {
        let (client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(b"250-mail.example.org greets you\r\n250-SIZE 35882577\r\n250 STARTTLS\r\n")
            .await
            .unwrap();

        let mut stream = BufStream::new(client);
        let reply = read_reply(&mut stream).await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 3);
        assert!(reply.text().contains("STARTTLS"));
    }

    #[tokio::test]
    async fn test_read_reply_on_closed_connection() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);

        let mut stream = BufStream::new(client);
        let err = read_reply(&mut stream).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_classification() {
        let transient = classify(&Reply {
            code: 421,
            lines: vec!["service not available".into()],
        });
        assert!(matches!(transient, TransportError::Transient { code: 421, .. }));

        let auth = classify(&Reply {
            code: 535,
            lines: vec!["5.7.8 username and password not accepted".into()],
        });
        assert!(matches!(auth, TransportError::AuthRejected(_)));

        let rejected = classify(&Reply {
            code: 550,
            lines: vec!["no such user".into()],
        });
        assert!(matches!(rejected, TransportError::Rejected { code: 550, .. }));
    }

    /// Scripted server covering the post-EHLO dialogue
    async fn scripted_server(
        mut stream: tokio::io::DuplexStream,
        auth_reply: &str,
    ) -> Vec<String> {
        let mut seen = Vec::new();
        let mut buf = Vec::new();
        let mut in_data = false;

        loop {
            let mut byte = [0u8; 1];
            if stream.read_exact(&mut byte).await.is_err() {
                break;
            }
            buf.push(byte[0]);
            if !buf.ends_with(b"\r\n") {
                continue;
            }
            let line = String::from_utf8_lossy(&buf).trim_end().to_string();
            buf.clear();

            if in_data {
                if line == "." {
                    in_data = false;
                    stream.write_all(b"250 queued\r\n").await.unwrap();
                }
                continue;
            }

            seen.push(line.clone());
            let reply: &[u8] = if line.starts_with("AUTH PLAIN") {
                auth_reply.as_bytes()
            } else if line.starts_with("MAIL FROM") || line.starts_with("RCPT TO") {
                b"250 ok\r\n"
            } else if line == "DATA" {
                in_data = true;
                b"354 end with .\r\n"
            } else if line == "QUIT" {
                stream.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                b"500 what\r\n"
            };
            stream.write_all(reply).await.unwrap();
        }
        seen
    }

    fn transport_with_credentials() -> SmtpTransport {
        SmtpTransport::new(MailConfig {
            username: Some("courier@aeromed.example".into()),
            password: Some("app-password".into()),
            use_tls: false,
            ..MailConfig::default()
        })
    }

    #[tokio::test]
    async fn test_transact_happy_path() {
        let (client, server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(scripted_server(server, "235 accepted\r\n"));

        let transport = transport_with_credentials();
        let mut stream = BufStream::new(client);
        transport.transact(&mut stream, &sample_mail()).await.unwrap();
        drop(stream);

        let seen = server_task.await.unwrap();
        assert!(seen.iter().any(|l| l.starts_with("AUTH PLAIN")));
        assert!(seen.contains(&"MAIL FROM:<no-reply@aeromed.example>".to_string()));
        assert!(seen.contains(&"RCPT TO:<amara@example.sl>".to_string()));
        assert!(seen.contains(&"DATA".to_string()));
    }

    #[tokio::test]
    async fn test_transact_surfaces_auth_rejection() {
        let (client, server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(scripted_server(
            server,
            "535 5.7.8 username and password not accepted\r\n",
        ));

        let transport = transport_with_credentials();
        let mut stream = BufStream::new(client);
        let err = transport
            .transact(&mut stream, &sample_mail())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::AuthRejected(_)));
        drop(stream);
        server_task.abort();
    }

    #[test]
    fn test_auth_plain_token_layout() {
        // \0user\0pass, base64-encoded
        let token = BASE64.encode("\0courier\0secret");
        let decoded = BASE64.decode(token).unwrap();
        assert_eq!(decoded, b"\0courier\0secret");
    }
}
