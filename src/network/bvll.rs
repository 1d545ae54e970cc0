//! BACnet/IP virtual link frames for the messages the router originates.
//!
//! Only the outbound side is encoded: I-Am-Router-To-Network, Who-Is, I-Am
//! and the BVLC wrappers that carry them (original unicast/broadcast,
//! forwarded, distribute-broadcast, foreign registration).

use std::net::SocketAddrV4;

use super::address::{Address, Station};
use crate::service::IAm;

/// BVLC type octet for BACnet/IP.
pub const BVLC_TYPE: u8 = 0x81;

/// BVLC functions sent by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BvlcFunction {
    ForwardedNpdu = 0x04,
    RegisterForeignDevice = 0x05,
    DistributeBroadcastToNetwork = 0x09,
    OriginalUnicastNpdu = 0x0A,
    OriginalBroadcastNpdu = 0x0B,
}

const NPDU_VERSION: u8 = 0x01;
/// Control bit: the NPDU carries a network layer message.
const NPDU_NETWORK_MESSAGE: u8 = 0x80;
/// Control bit: DNET, DLEN and DADR are present.
const NPDU_DESTINATION: u8 = 0x20;
const HOP_COUNT: u8 = 0xFF;
const GLOBAL_NETWORK: u16 = 0xFFFF;

const MESSAGE_I_AM_ROUTER_TO_NETWORK: u8 = 0x01;

const APDU_UNCONFIRMED_REQUEST: u8 = 0x10;
const SERVICE_I_AM: u8 = 0x00;
const SERVICE_WHO_IS: u8 = 0x08;

const TAG_UNSIGNED: u8 = 2;
const TAG_ENUMERATED: u8 = 9;
const TAG_OBJECT_IDENTIFIER: u8 = 12;

/// Wrap `payload` in a BVLC header.
pub fn frame(function: BvlcFunction, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.push(BVLC_TYPE);
    out.push(function as u8);
    // Payloads built here are a few dozen octets.
    let length = u16::try_from(4 + payload.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Forwarded-NPDU carrying the B/IP address of the station that originated it.
pub fn forwarded(origin: SocketAddrV4, npdu: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(6 + npdu.len());
    payload.extend_from_slice(&ip_octets(origin));
    payload.extend_from_slice(npdu);
    frame(BvlcFunction::ForwardedNpdu, &payload)
}

/// Register-Foreign-Device with a time-to-live in seconds.
pub fn register_foreign_device(ttl: u16) -> Vec<u8> {
    frame(BvlcFunction::RegisterForeignDevice, &ttl.to_be_bytes())
}

/// I-Am-Router-To-Network NPDU for `networks`.
pub fn i_am_router_to_network(networks: &[u16]) -> Vec<u8> {
    let mut npdu = Vec::with_capacity(3 + networks.len() * 2);
    npdu.push(NPDU_VERSION);
    npdu.push(NPDU_NETWORK_MESSAGE);
    npdu.push(MESSAGE_I_AM_ROUTER_TO_NETWORK);
    for network in networks {
        npdu.extend_from_slice(&network.to_be_bytes());
    }
    npdu
}

/// NPDU carrying an unconfirmed APDU to `destination`.
///
/// Local destinations need no network header. Remote and global ones carry
/// DNET/DADR and a full hop count.
#[allow(clippy::cast_possible_truncation)]
pub fn npdu(destination: &Address, apdu: &[u8]) -> Vec<u8> {
    let mut npdu = Vec::with_capacity(16 + apdu.len());
    npdu.push(NPDU_VERSION);

    let remote = match destination {
        Address::Local(_) | Address::LocalBroadcast => None,
        Address::GlobalBroadcast => Some((GLOBAL_NETWORK, Vec::new())),
        Address::RemoteBroadcast(network) => Some((*network, Vec::new())),
        Address::Remote { network, station } => Some((*network, station_octets(station))),
    };

    match remote {
        None => npdu.push(0x00),
        Some((network, dadr)) => {
            npdu.push(NPDU_DESTINATION);
            npdu.extend_from_slice(&network.to_be_bytes());
            // DADR is at most six octets.
            npdu.push(dadr.len() as u8);
            npdu.extend_from_slice(&dadr);
            npdu.push(HOP_COUNT);
        }
    }

    npdu.extend_from_slice(apdu);
    npdu
}

/// Who-Is APDU, optionally limited to an instance range.
pub fn who_is(range: Option<(u32, u32)>) -> Vec<u8> {
    let mut apdu = vec![APDU_UNCONFIRMED_REQUEST, SERVICE_WHO_IS];
    if let Some((low, high)) = range {
        push_unsigned(&mut apdu, 0, true, u64::from(low));
        push_unsigned(&mut apdu, 1, true, u64::from(high));
    }
    apdu
}

/// I-Am APDU.
pub fn i_am(i_am: &IAm) -> Vec<u8> {
    let mut apdu = vec![APDU_UNCONFIRMED_REQUEST, SERVICE_I_AM];

    let object = (u32::from(i_am.device.object_type.number()) << 22) | (i_am.device.instance & 0x003F_FFFF);
    push_tag(&mut apdu, TAG_OBJECT_IDENTIFIER, false, 4);
    apdu.extend_from_slice(&object.to_be_bytes());

    push_unsigned(&mut apdu, TAG_UNSIGNED, false, i_am.max_apdu_length);
    push_unsigned(&mut apdu, TAG_ENUMERATED, false, u64::from(i_am.segmentation));
    push_unsigned(&mut apdu, TAG_UNSIGNED, false, i_am.vendor_id);
    apdu
}

fn push_tag(out: &mut Vec<u8>, number: u8, context: bool, len: u8) {
    let class = if context { 0x08 } else { 0x00 };
    if len <= 4 {
        out.push((number << 4) | class | len);
    } else {
        out.push((number << 4) | class | 0x05);
        out.push(len);
    }
}

/// Unsigned or enumerated value in the fewest octets.
#[allow(clippy::cast_possible_truncation)]
fn push_unsigned(out: &mut Vec<u8>, number: u8, context: bool, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
    push_tag(out, number, context, (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn ip_octets(addr: SocketAddrV4) -> [u8; 6] {
    let [a, b, c, d] = addr.ip().octets();
    let [hi, lo] = addr.port().to_be_bytes();
    [a, b, c, d, hi, lo]
}

fn station_octets(station: &Station) -> Vec<u8> {
    match station {
        Station::Mac(mac) => vec![*mac],
        Station::Ip(addr) => ip_octets(*addr).to_vec(),
    }
}
