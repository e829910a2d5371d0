use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use atcmd::channel::ByteChannel;
use atcmd::parser::AtParser;
use atcmd::template::{args, ResponseTemplate};
use tracing::debug;

use crate::cmd::{unescape, SendArgs};
use crate::exit::{parser_error, template_error, CliResult, SUCCESS};
use crate::output::{print_session, OutputFormat, ResponseOutput, SessionOutput};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.parser_config()?;
    let command = unescape(&args.command)?;

    // Parse every template before touching the device.
    let mut expected = Vec::with_capacity(args.expect.len());
    for raw in &args.expect {
        let text = unescape(raw)?;
        let response = ResponseTemplate::parse(&text, &config.delimiter)
            .map_err(|err| template_error(&format!("invalid template {raw:?}"), err))?;
        expected.push((text, response));
    }

    let channel = open_device(&args.path)?;
    let mut at = AtParser::new(channel, config).map_err(|err| parser_error("setup failed", err))?;

    let observed = Rc::new(RefCell::new(Vec::new()));
    for raw in &args.oob {
        let prefix = unescape(raw)?;
        let seen = Rc::clone(&observed);
        let name = prefix.clone();
        at.oob(prefix, move |_| seen.borrow_mut().push(name.clone()));
    }

    if !args.no_flush {
        let discarded = at
            .flush()
            .map_err(|err| parser_error("flush failed", err))?;
        if discarded > 0 {
            debug!(discarded, "discarded stale input");
        }
    }

    at.send("%s", &args![command.as_str()])
        .map_err(|err| parser_error("send failed", err))?;

    let mut responses = Vec::with_capacity(expected.len());
    for (template, response) in expected {
        let captures = at
            .recv_response(&response)
            .map_err(|err| parser_error(&format!("receive failed waiting for {template:?}"), err))?;
        responses.push(ResponseOutput { template, captures });
    }

    let oob = observed.borrow().clone();
    print_session(
        &SessionOutput {
            command,
            responses,
            oob,
        },
        format,
    );
    Ok(SUCCESS)
}

/// Open a Unix socket or a device node, picking by file type.
#[cfg(unix)]
fn open_device(path: &Path) -> CliResult<Box<dyn ByteChannel>> {
    use std::os::unix::fs::FileTypeExt;

    use atcmd::channel::{StreamChannel, UnixDomainSocket};

    use crate::exit::{channel_error, io_error};

    let metadata = std::fs::metadata(path)
        .map_err(|err| io_error(&format!("cannot open {}", path.display()), err))?;

    if metadata.file_type().is_socket() {
        let stream = UnixDomainSocket::connect(path)
            .map_err(|err| channel_error("connect failed", err))?;
        Ok(Box::new(stream))
    } else {
        let device =
            StreamChannel::open(path).map_err(|err| channel_error("open failed", err))?;
        Ok(Box::new(device))
    }
}

#[cfg(not(unix))]
fn open_device(path: &Path) -> CliResult<Box<dyn ByteChannel>> {
    Err(crate::exit::CliError::new(
        crate::exit::TRANSPORT_ERROR,
        format!("{}: only Unix sockets and device nodes are supported", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::{CliError, TRANSPORT_ERROR};

    #[cfg(unix)]
    #[test]
    fn missing_device_is_a_transport_error() {
        let err = open_device(Path::new("/nonexistent/atcmd-test-device")).err().expect("open_device should fail");
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn cli_error_keeps_message() {
        let err = CliError::new(TRANSPORT_ERROR, "boom");
        assert_eq!(err.to_string(), "boom");
    }
}
