//! `telnet:` checking: a TCP connect to the host

use crate::checker::{connect_tcp, CheckContext, CheckError, Checker, ErrorKind, UrlRecord};
use crate::url::host_and_port;
use std::net::{Shutdown, TcpStream};
use url::Url;

const TELNET_PORT: u16 = 23;

/// Checks `telnet:` URLs
#[derive(Debug, Default)]
pub struct TelnetChecker {
    stream: Option<TcpStream>,
}

impl TelnetChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checker for TelnetChecker {
    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let (host, port) = record
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .and_then(|url| host_and_port(&url, TELNET_PORT))
            .ok_or_else(|| CheckError::new(ErrorKind::Syntax, "telnet URL has no host"))?;

        let stream = connect_tcp(&host, port, ctx.config.checking.timeout_duration())?;
        record.set_result(format!("Connected to {}:{}", host, port), true);
        self.stream = Some(stream);
        Ok(())
    }

    fn close_connection(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::LinkOrigin;
    use crate::config::Config;
    use std::net::TcpListener;
    use std::sync::Arc;

    #[test]
    fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = CheckContext::new(Arc::new(Config::default()), &[]).unwrap();

        let mut checker = TelnetChecker::new();
        let link = format!("telnet://127.0.0.1:{}/", port);
        let mut record = UrlRecord::new(&link, 0, LinkOrigin::default());
        checker.check_syntax(&mut record).unwrap();
        checker.check_connection(&ctx, &mut record).unwrap();
        checker.close_connection();
        checker.close_connection();

        assert!(record.valid);
        assert!(record.result.starts_with("Connected to 127.0.0.1"));
    }
}
