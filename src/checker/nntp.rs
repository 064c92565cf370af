//! `news:`, `nntp:` and `snews:` checking
//!
//! The server comes from the URL or from the `nntp-server` setting. A
//! newsgroup named in the URL is selected with `GROUP`; a message id is
//! only checked for syntax.

use crate::checker::ftp::read_reply;
use crate::checker::record::tags;
use crate::checker::{connect_tcp, CheckContext, CheckError, Checker, ErrorKind, UrlRecord};
use crate::url::extract_domain;
use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use url::Url;

const NNTP_PORT: u16 = 119;
const SNEWS_PORT: u16 = 563;

/// Checks news URLs
#[derive(Debug, Default)]
pub struct NntpChecker {
    stream: Option<TcpStream>,
}

impl NntpChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What a news URL refers to
#[derive(Debug, Clone, PartialEq, Eq)]
enum NewsTarget {
    Group(String),
    Article(String),
    Nothing,
}

fn news_target(url: &Url) -> NewsTarget {
    let path = url.path().trim_start_matches('/');
    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() || first == "*" {
        NewsTarget::Nothing
    } else if first.contains('@') {
        NewsTarget::Article(first.to_string())
    } else {
        NewsTarget::Group(first.to_string())
    }
}

impl Checker for NntpChecker {
    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let url = record
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .ok_or_else(|| CheckError::new(ErrorKind::Internal, "syntax check left no URL"))?;

        let Some(server) = extract_domain(&url).or_else(|| ctx.config.checking.nntp_server.clone())
        else {
            record.add_warning(
                tags::NNTP_NO_SERVER,
                "No NNTP server was specified, skipping this URL.",
            );
            record.set_result("No NNTP server", true);
            return Ok(());
        };

        if url.scheme() == "snews" {
            record.add_info("Secure news is checked with a plain TCP connect.");
        }
        let default_port = if url.scheme() == "snews" {
            SNEWS_PORT
        } else {
            NNTP_PORT
        };
        let port = url.port().unwrap_or(default_port);

        let stream = connect_tcp(&server, port, ctx.config.checking.timeout_duration())?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream.try_clone()?);
        self.stream = Some(stream);

        if url.scheme() == "snews" {
            record.set_result(format!("Connected to {}:{}", server, port), true);
            return Ok(());
        }

        let (code, text) = read_reply(&mut reader)?;
        if code != 200 && code != 201 {
            return Err(CheckError::new(
                ErrorKind::Protocol,
                format!("News server not ready: {} {}", code, text),
            ));
        }
        record.add_info(format!("News server greeting: {}", text));

        match news_target(&url) {
            NewsTarget::Group(group) => {
                writer.write_all(format!("GROUP {}\r\n", group).as_bytes())?;
                let (code, text) = read_reply(&mut reader)?;
                if code == 211 {
                    record.add_info(format!("Newsgroup {}: {}", group, text));
                } else {
                    record.add_warning(
                        tags::NNTP_NO_NEWSGROUP,
                        format!("No newsgroup specified in NNTP URL, or {} not found.", group),
                    );
                }
            }
            NewsTarget::Article(id) => {
                record.add_info(format!("Article <{}> not retrieved.", id));
            }
            NewsTarget::Nothing => {
                record.add_warning(
                    tags::NNTP_NO_NEWSGROUP,
                    "No newsgroup specified in NNTP URL.",
                );
            }
        }

        record.set_result("News server ready", true);
        Ok(())
    }

    fn close_connection(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.write_all(b"QUIT\r\n");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::LinkOrigin;
    use crate::config::Config;
    use std::io::{BufRead, Write as _};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_news_target() {
        let group = Url::parse("news:comp.lang.rust").unwrap();
        assert_eq!(news_target(&group), NewsTarget::Group("comp.lang.rust".to_string()));

        let article = Url::parse("news:1234@example.com").unwrap();
        assert!(matches!(news_target(&article), NewsTarget::Article(_)));

        let server_only = Url::parse("nntp://news.example.com/").unwrap();
        assert_eq!(news_target(&server_only), NewsTarget::Nothing);
    }

    #[test]
    fn test_no_server_warns() {
        let ctx = CheckContext::new(Arc::new(Config::default()), &[]).unwrap();
        let mut checker = NntpChecker::new();
        let mut record = UrlRecord::new("news:comp.lang.rust", 0, LinkOrigin::default());
        checker.check_syntax(&mut record).unwrap();

        checker.check_connection(&ctx, &mut record).unwrap();

        assert!(record.valid);
        assert_eq!(record.warnings[0].tag, tags::NNTP_NO_SERVER);
    }

    #[test]
    fn test_group_against_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = std::io::BufReader::new(stream);
            writer.write_all(b"200 fake news ready\r\n").unwrap();
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "GROUP missing.group\r\n");
            writer.write_all(b"411 no such group\r\n").unwrap();
        });

        let ctx = CheckContext::new(Arc::new(Config::default()), &[]).unwrap();
        let mut checker = NntpChecker::new();
        let link = format!("nntp://127.0.0.1:{}/missing.group", port);
        let mut record = UrlRecord::new(&link, 0, LinkOrigin::default());
        checker.check_syntax(&mut record).unwrap();

        checker.check_connection(&ctx, &mut record).unwrap();
        checker.close_connection();
        server.join().unwrap();

        assert!(record.valid);
        assert_eq!(record.warnings[0].tag, tags::NNTP_NO_NEWSGROUP);
    }
}
