//! Drive a scripted in-memory modem through a short session.
//!
//! Run with: cargo run --example loopback-session

use std::cell::RefCell;
use std::rc::Rc;

use atcmd::channel::MemoryChannel;
use atcmd::parser::{AtParser, ParserConfig};
use atcmd::template::args;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (channel, modem) = MemoryChannel::new();
    modem.push_input(b"RDY\r\n");
    modem.respond_to(b"AT\r\n", b"OK\r\n");
    modem.respond_to(b"AT+CSQ\r\n", b"+CREG: 1\r\n+CSQ: 23,99\r\nOK\r\n");
    modem.respond_to(
        b"AT+CGDCONT=1,\"IP\",\"internet\"\r\n",
        b"OK\r\n",
    );

    let mut at = AtParser::new(channel, ParserConfig::default())?;

    let registrations = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&registrations);
    at.oob("+CREG", move |at| {
        if let Ok((stat,)) = at.recv_as::<(u8,)>(":%u") {
            seen.borrow_mut().push(stat);
        }
    });

    at.send("AT", &[])?;
    at.recv("OK")?;
    println!("modem is alive");

    at.send("AT+CSQ", &[])?;
    let (rssi, ber): (i32, i32) = at.recv_as("+CSQ: %d,%d\r\nOK")?;
    println!("signal quality: rssi={rssi} ber={ber}");

    at.send("AT+CGDCONT=1,\"IP\",\"%s\"", &args!["internet"])?;
    at.recv("OK")?;
    println!("context configured");

    println!("registration updates: {:?}", registrations.borrow());
    println!("wire log: {}", modem.output().escape_ascii());
    Ok(())
}
