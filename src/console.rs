//! Operator console: text commands in, request results out.
//!
//! ```text
//! read <addr> <objid> <prop> [index]
//! write <addr> <objid> <prop> <value> [index|-] [priority]
//! whois [addr] [lo hi]
//! iam
//! rtn <addr> <net>...
//! ```
//!
//! The console never touches the network directly. Each command becomes a
//! request handed to the event loop's [`Scheduler`], and the console waits on
//! that request's own handle.

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::ConsoleSettings;
use crate::network::{Address, VirtualNetworkTopology};
use crate::object::ObjectId;
use crate::service::{IAm, IoResult, Request, Response, Scheduler};
use crate::value::{PropertyValue, ValueKind};

const HELP: &str = "\
commands:
    read <addr> <objid> <prop> [index]
    write <addr> <objid> <prop> <value> [index|-] [priority]
    whois [addr] [lo hi]
    iam
    rtn <addr> <net> ...
    help
    exit
values: null, text parsed by the property's datatype, or <tag>:<text> with
tag one of b u i r d o c bs e date time id";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Request(Request),
    /// Networks reachable through a router on the external network.
    Rtn { router: Address, networks: Vec<u16> },
    Help,
    Exit,
}

/// Parse one console line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let args = split_args(line)?;
    let Some((name, args)) = args.split_first() else {
        return Ok(None);
    };
    if name.starts_with('#') {
        return Ok(None);
    }

    let command = match name.as_str() {
        "read" => parse_read(args)?,
        "write" => parse_write(args)?,
        "whois" => parse_whois(args)?,
        "iam" => {
            if !args.is_empty() {
                bail!("usage: iam");
            }
            Command::Request(Request::IAm {
                destination: Address::GlobalBroadcast,
            })
        }
        "rtn" => parse_rtn(args)?,
        "help" | "?" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(Some(command))
}

fn parse_read(args: &[String]) -> anyhow::Result<Command> {
    let [addr, objid, prop, rest @ ..] = args else {
        bail!("usage: read <addr> <objid> <prop> [index]");
    };
    let index = match rest {
        [] => None,
        [index] => Some(parse_number::<u32>("index", index)?),
        _ => bail!("usage: read <addr> <objid> <prop> [index]"),
    };

    Ok(Command::Request(Request::ReadProperty {
        destination: parse_address(addr)?,
        object: parse_object(objid)?,
        property: prop.clone(),
        index,
    }))
}

fn parse_write(args: &[String]) -> anyhow::Result<Command> {
    let [addr, objid, prop, value, rest @ ..] = args else {
        bail!("usage: write <addr> <objid> <prop> <value> [index|-] [priority]");
    };
    let (index, priority) = match rest {
        [] => (None, None),
        [index] => (parse_index(index)?, None),
        [index, priority] => (parse_index(index)?, Some(parse_number::<u8>("priority", priority)?)),
        _ => bail!("usage: write <addr> <objid> <prop> <value> [index|-] [priority]"),
    };

    let object = parse_object(objid)?;
    let kind = object
        .object_type
        .properties()
        .get(prop)
        .map_or(ValueKind::Any, |spec| spec.kind);
    let value = parse_value(kind, value, index).with_context(|| format!("{prop}: invalid value '{value}'"))?;

    Ok(Command::Request(Request::WriteProperty {
        destination: parse_address(addr)?,
        object,
        property: prop.clone(),
        value,
        index,
        priority,
    }))
}

fn parse_whois(args: &[String]) -> anyhow::Result<Command> {
    let (destination, range) = match args {
        [] => (Address::GlobalBroadcast, None),
        [addr] => (parse_address(addr)?, None),
        [lo, hi] => (Address::GlobalBroadcast, Some(parse_range(lo, hi)?)),
        [addr, lo, hi] => (parse_address(addr)?, Some(parse_range(lo, hi)?)),
        _ => bail!("usage: whois [addr] [lo hi]"),
    };
    Ok(Command::Request(Request::WhoIs { destination, range }))
}

fn parse_rtn(args: &[String]) -> anyhow::Result<Command> {
    let [router, networks @ ..] = args else {
        bail!("usage: rtn <addr> <net> ...");
    };
    if networks.is_empty() {
        bail!("usage: rtn <addr> <net> ...");
    }
    let networks = networks
        .iter()
        .map(|net| parse_number::<u16>("network", net))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Command::Rtn {
        router: parse_address(router)?,
        networks,
    })
}

fn parse_range(lo: &str, hi: &str) -> anyhow::Result<(u32, u32)> {
    let lo = parse_number("low limit", lo)?;
    let hi = parse_number("high limit", hi)?;
    if lo > hi {
        bail!("low limit {lo} is above high limit {hi}");
    }
    Ok((lo, hi))
}

fn parse_index(text: &str) -> anyhow::Result<Option<u32>> {
    if text == "-" {
        Ok(None)
    } else {
        parse_number("index", text).map(Some)
    }
}

fn parse_address(text: &str) -> anyhow::Result<Address> {
    text.parse().map_err(|e| anyhow!("{e}"))
}

fn parse_object(text: &str) -> anyhow::Result<ObjectId> {
    text.parse().map_err(|e: String| anyhow!(e))
}

fn parse_number<T: std::str::FromStr>(what: &str, text: &str) -> anyhow::Result<T> {
    text.parse()
        .map_err(|_| anyhow!("invalid {what} '{text}'"))
}

/// Turn console text into a value for a property of datatype `kind`.
///
/// `null` is accepted everywhere. Index 0 of an array is its length. Array
/// elements and `Any` properties take a `<tag>:<text>` literal.
pub fn parse_value(kind: ValueKind, text: &str, index: Option<u32>) -> anyhow::Result<PropertyValue> {
    if text == "null" {
        return Ok(PropertyValue::Null);
    }

    match (kind, index) {
        (ValueKind::Any, _) | (ValueKind::List, Some(1..)) => parse_tagged(text),
        (ValueKind::List, Some(0)) => parse_atomic(ValueKind::Unsigned, text),
        (ValueKind::List | ValueKind::Structured, _) => {
            bail!("{kind} values cannot be entered from the console")
        }
        (kind, _) => parse_atomic(kind, text),
    }
}

fn parse_tagged(text: &str) -> anyhow::Result<PropertyValue> {
    let (tag, rest) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected <tag>:<value>, e.g. r:72.5"))?;
    let kind = match tag {
        "b" => ValueKind::Boolean,
        "u" => ValueKind::Unsigned,
        "i" => ValueKind::Integer,
        "r" => ValueKind::Real,
        "d" => ValueKind::Double,
        "o" => ValueKind::OctetString,
        "c" => ValueKind::CharacterString,
        "bs" => ValueKind::BitString,
        "e" => ValueKind::Enumerated,
        "date" => ValueKind::Date,
        "time" => ValueKind::Time,
        "id" => ValueKind::ObjectIdentifier,
        other => bail!("unknown value tag '{other}'"),
    };
    parse_atomic(kind, rest)
}

fn parse_atomic(kind: ValueKind, text: &str) -> anyhow::Result<PropertyValue> {
    let value = match kind {
        ValueKind::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "active" => PropertyValue::Boolean(true),
            "false" | "0" | "inactive" => PropertyValue::Boolean(false),
            _ => bail!("expected true or false"),
        },
        ValueKind::Unsigned => PropertyValue::Unsigned(text.parse()?),
        ValueKind::Integer => PropertyValue::Integer(text.parse()?),
        ValueKind::Real => PropertyValue::Real(text.parse()?),
        ValueKind::Double => PropertyValue::Double(text.parse()?),
        ValueKind::OctetString => PropertyValue::OctetString(hex::decode(text)?),
        ValueKind::CharacterString => PropertyValue::text(text),
        ValueKind::BitString => PropertyValue::BitString(
            text.chars()
                .map(|c| match c {
                    '1' => Ok(true),
                    '0' => Ok(false),
                    other => Err(anyhow!("bit strings use 0 and 1, found '{other}'")),
                })
                .collect::<anyhow::Result<_>>()?,
        ),
        ValueKind::Enumerated => PropertyValue::Enumerated(text.parse()?),
        ValueKind::Date => PropertyValue::Date(text.parse().context("expected YYYY-MM-DD")?),
        ValueKind::Time => PropertyValue::Time(text.parse().context("expected HH:MM:SS")?),
        ValueKind::ObjectIdentifier => PropertyValue::ObjectIdentifier(parse_object(text)?),
        ValueKind::Null | ValueKind::List | ValueKind::Structured | ValueKind::Any => {
            bail!("{kind} is not an atomic datatype")
        }
    };
    Ok(value)
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_args(line: &str) -> anyhow::Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_arg = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if quoted {
        bail!("unterminated quote");
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

/// Render a request outcome the way the console prints it.
///
/// Reads print the value, followed by the inspection form of constructed
/// values. Writes print `ack`. Unconfirmed requests print nothing.
pub fn format_response(result: &IoResult) -> String {
    match result {
        Ok(Response::ReadAck(ack)) => {
            let mut out = format!("{}\n", ack.value);
            if ack.value.has_debug_contents() {
                let mut contents = Vec::new();
                if ack.value.debug_contents(&mut contents, 1).is_ok() {
                    out.push_str(&String::from_utf8_lossy(&contents));
                }
            }
            out
        }
        Ok(Response::Ack) => "ack\n".to_string(),
        Ok(Response::Sent) => String::new(),
        Err(e) => format!("{e}\n"),
    }
}

fn format_i_am(i_am: &IAm) -> String {
    format!("iam {i_am}\n")
}

/// Run the console until `exit` or end of input, then stop the event loop.
pub async fn run<R, W>(
    scheduler: Scheduler,
    mut indications: UnboundedReceiver<IAm>,
    settings: &ConsoleSettings,
    input: R,
    mut output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let timeout = settings.timeout();
    info!(?timeout, "Console ready");

    let mut show_prompt = true;
    loop {
        if show_prompt && !settings.prompt.is_empty() {
            output.write_all(settings.prompt.as_bytes()).await?;
            output.flush().await?;
        }
        show_prompt = true;

        let line = tokio::select! {
            line = lines.next_line() => line.context("reading console input")?,
            Some(i_am) = indications.recv() => {
                // The prompt is still on screen.
                output.write_all(format_i_am(&i_am).as_bytes()).await?;
                output.flush().await?;
                show_prompt = false;
                continue;
            }
        };
        let Some(line) = line else {
            debug!("Console input closed");
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                output.write_all(format!("{e:#}\n").as_bytes()).await?;
                continue;
            }
        };

        match command {
            Command::Request(request) => {
                let text = execute(&scheduler, request, timeout, &mut indications).await;
                output.write_all(text.as_bytes()).await?;
            }
            Command::Rtn { router, networks } => {
                let queued = scheduler.deferred(move |topology: &mut VirtualNetworkTopology| {
                    topology.update_router_references(router, &networks);
                });
                if !queued {
                    warn!("Event loop stopped, route not recorded");
                }
            }
            Command::Help => {
                output.write_all(HELP.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            Command::Exit => break,
        }
        output.flush().await?;
    }

    output.flush().await?;
    scheduler.shutdown();
    Ok(())
}

/// Send one request and collect everything to print for it.
async fn execute(
    scheduler: &Scheduler,
    request: Request,
    timeout: Duration,
    indications: &mut UnboundedReceiver<IAm>,
) -> String {
    debug!(service = request.service(), destination = %request.destination(), "Console request");
    let result = scheduler.request(request).wait_timeout(timeout).await;

    let mut text = String::new();
    while let Ok(i_am) = indications.try_recv() {
        text.push_str(&format_i_am(&i_am));
    }
    text.push_str(&format_response(&result));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockTransport;
    use crate::network::{BipMode, TopologyConfig};
    use crate::object::ObjectType;
    use crate::service::{EventLoop, ReadAck, RequestError};
    use crate::store::SnapshotStore;
    use crate::value::Structured;

    fn request(line: &str) -> Request {
        match parse_command(line).unwrap() {
            Some(Command::Request(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_read() {
        assert_eq!(
            request("read 20:2 analog-input:0 presentValue"),
            Request::ReadProperty {
                destination: Address::remote_mac(20, 2),
                object: ObjectId::new(ObjectType::AnalogInput, 0),
                property: "presentValue".to_string(),
                index: None,
            }
        );
        let Request::ReadProperty { index, .. } = request("read 20:2 device:200 objectList 3") else {
            panic!("expected a read");
        };
        assert_eq!(index, Some(3));
        assert!(parse_command("read 20:2").is_err());
    }

    #[test]
    fn test_parse_write_index_and_priority() {
        let Request::WriteProperty {
            value,
            index,
            priority,
            ..
        } = request("write 20:2 analog-value:1 presentValue 12.5 - 8")
        else {
            panic!("expected a write");
        };
        assert_eq!(value, PropertyValue::Real(12.5));
        assert_eq!(index, None);
        assert_eq!(priority, Some(8));
    }

    #[test]
    fn test_parse_write_quoted_text() {
        let Request::WriteProperty { value, .. } =
            request(r#"write 20:2 analog-value:1 description "zone 4 supply""#)
        else {
            panic!("expected a write");
        };
        assert_eq!(value, PropertyValue::text("zone 4 supply"));
    }

    #[test]
    fn test_parse_whois_forms() {
        assert_eq!(
            request("whois"),
            Request::WhoIs {
                destination: Address::GlobalBroadcast,
                range: None
            }
        );
        assert_eq!(
            request("whois 10 20"),
            Request::WhoIs {
                destination: Address::GlobalBroadcast,
                range: Some((10, 20))
            }
        );
        assert_eq!(
            request("whois 20:* 10 20"),
            Request::WhoIs {
                destination: Address::RemoteBroadcast(20),
                range: Some((10, 20))
            }
        );
        assert!(parse_command("whois 20 10").is_err());
    }

    #[test]
    fn test_parse_rtn_and_misc() {
        assert_eq!(
            parse_command("rtn 192.168.0.1 30 31").unwrap(),
            Some(Command::Rtn {
                router: "192.168.0.1".parse().unwrap(),
                networks: vec![30, 31],
            })
        );
        assert!(parse_command("rtn 192.168.0.1").is_err());
        assert_eq!(parse_command("  ").unwrap(), None);
        assert_eq!(parse_command("# note").unwrap(), None);
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Exit));
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_parse_value_by_kind() {
        assert_eq!(parse_value(ValueKind::Real, "null", None).unwrap(), PropertyValue::Null);
        assert_eq!(
            parse_value(ValueKind::Unsigned, "7", None).unwrap(),
            PropertyValue::Unsigned(7)
        );
        assert_eq!(
            parse_value(ValueKind::List, "4", Some(0)).unwrap(),
            PropertyValue::Unsigned(4)
        );
        assert_eq!(
            parse_value(ValueKind::List, "r:1.5", Some(2)).unwrap(),
            PropertyValue::Real(1.5)
        );
        assert!(parse_value(ValueKind::List, "1,2", None).is_err());
        assert!(parse_value(ValueKind::Unsigned, "-1", None).is_err());
    }

    #[test]
    fn test_parse_tagged_literals() {
        assert_eq!(parse_tagged("b:1").unwrap(), PropertyValue::Boolean(true));
        assert_eq!(parse_tagged("i:-3").unwrap(), PropertyValue::Integer(-3));
        assert_eq!(parse_tagged("o:0aff").unwrap(), PropertyValue::OctetString(vec![0x0a, 0xff]));
        assert_eq!(parse_tagged("bs:101").unwrap(), PropertyValue::BitString(vec![true, false, true]));
        assert_eq!(parse_tagged("e:2").unwrap(), PropertyValue::Enumerated(2));
        assert_eq!(
            parse_tagged("id:analog-value:3").unwrap(),
            PropertyValue::ObjectIdentifier(ObjectId::new(ObjectType::AnalogValue, 3))
        );
        assert_eq!(
            parse_tagged("date:2021-06-01").unwrap().to_string(),
            "2021-06-01"
        );
        assert!(parse_tagged("72.5").is_err());
        assert!(parse_tagged("x:1").is_err());
    }

    #[test]
    fn test_format_response() {
        assert_eq!(format_response(&Ok(Response::Ack)), "ack\n");
        assert_eq!(format_response(&Ok(Response::Sent)), "");
        assert_eq!(
            format_response(&Err(RequestError::Timeout)),
            "timeout\n"
        );

        let value = PropertyValue::Structured(
            Structured::new("Reference").with_field("objectIdentifier", PropertyValue::Unsigned(5)),
        );
        let text = format_response(&Ok(Response::ReadAck(ReadAck {
            object: ObjectId::device(1),
            property: "x".to_string(),
            index: None,
            value,
        })));
        assert_eq!(text, "<Reference>\n    objectIdentifier = 5\n");
    }

    fn event_loop() -> EventLoop {
        let mut store = SnapshotStore::in_memory().unwrap();
        for id in [10_u32, 11] {
            let devid = id.to_string();
            let objid = format!("device:{id}");
            store
                .set(&devid, &objid, "objectName", &PropertyValue::text(format!("Device {id}")))
                .unwrap();
            store
                .set(&devid, &objid, "vendorIdentifier", &PropertyValue::Unsigned(15))
                .unwrap();
        }
        store
            .set("11", "analog-value:1", "presentValue", &PropertyValue::Real(1.0))
            .unwrap();
        let config = TopologyConfig {
            local_address: "10.0.0.1/24".parse().unwrap(),
            local_network: 1,
            vlan_network: 2,
            device_ids: vec![10, 11],
            bip_mode: BipMode::Simple,
        };
        let topology =
            VirtualNetworkTopology::build(&store, config, Box::new(MockTransport::new())).unwrap();
        EventLoop::new(topology).with_signals(false)
    }

    async fn session(input: &str) -> String {
        let mut event_loop = event_loop();
        let indications = event_loop.indications();
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        let settings = ConsoleSettings {
            timeout_secs: 5,
            prompt: String::new(),
        };
        let mut output = Vec::new();
        run(scheduler, indications, &settings, input.as_bytes(), &mut output)
            .await
            .unwrap();
        task.await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_session_read_write() {
        let output = session(
            "read 2:2 analog-value:1 presentValue\n\
             write 2:2 analog-value:1 presentValue 4.5\n\
             read 2:2 analog-value:1 presentValue\n\
             read 2:9 device:11 objectName\n\
             exit\n\
             read 2:2 device:11 objectName\n",
        )
        .await;
        assert_eq!(output, "1\nack\n4.5\n2:9 unreachable: no node at that segment address\n");
    }

    #[tokio::test]
    async fn test_session_whois_prints_i_am() {
        let output = session("whois 2:*\n").await;
        assert_eq!(output, "iam device:11 from 2:2 (vendor 15, max apdu 1024)\n");
    }

    #[tokio::test]
    async fn test_session_reports_parse_errors() {
        let output = session("read\nhelp\n").await;
        assert!(output.starts_with("usage: read"));
        assert!(output.contains("whois [addr] [lo hi]"));
    }

    #[tokio::test]
    async fn test_unsolicited_i_am_keeps_prompt() {
        let event_loop = event_loop();
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        let (i_am_tx, i_am_rx) = tokio::sync::mpsc::unbounded_channel();
        let (mut typed, input) = tokio::io::duplex(64);
        let console = tokio::spawn(async move {
            let settings = ConsoleSettings {
                timeout_secs: 5,
                prompt: "> ".to_string(),
            };
            let mut output = Vec::new();
            run(scheduler, i_am_rx, &settings, tokio::io::BufReader::new(input), &mut output)
                .await
                .unwrap();
            output
        });

        i_am_tx
            .send(IAm {
                source: "2:2".parse().unwrap(),
                device: ObjectId::device(11),
                max_apdu_length: 1024,
                segmentation: 3,
                vendor_id: 15,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        typed.write_all(b"exit\n").await.unwrap();

        let output = console.await.unwrap();
        task.await.unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "> iam device:11 from 2:2 (vendor 15, max apdu 1024)\n"
        );
    }
}
