//! Device port manager tests.

use mips_pipeline::common::PortError;
use mips_pipeline::ports::{pipe_pair, PortManager, WordChannel, MAX_PORTS};

/// Words written on one end of a pipe pair come out the other end.
#[test]
fn pipe_pair_round_trips_words() {
    let (mut a, mut b) = pipe_pair();
    a.write_word(17).unwrap();
    a.write_word(-17).unwrap();
    assert_eq!(b.read_word().unwrap(), 17);
    assert_eq!(b.read_word().unwrap(), -17);
    b.write_word(5).unwrap();
    assert_eq!(a.read_word().unwrap(), 5);
}

/// Accessing a slot with no channel fails without panicking.
#[test]
fn unconnected_slot_fails() {
    let mut ports = PortManager::new();
    assert!(matches!(ports.read(3), Err(PortError::Unconnected(3))));
    assert!(matches!(ports.write(3, 1), Err(PortError::Unconnected(3))));
    assert!(matches!(
        ports.remove_port(3),
        Err(PortError::Unconnected(3))
    ));
}

/// Device numbers outside the table are rejected.
#[test]
fn out_of_range_device_fails() {
    let mut ports = PortManager::new();
    let device = MAX_PORTS as u32;
    assert!(matches!(ports.read(device), Err(PortError::BadDevice(_))));
}

/// A slot holds one channel at a time; freeing it allows reattachment.
#[test]
fn slot_busy_until_removed() {
    let mut ports = PortManager::new();
    let (end_a, _keep_a) = pipe_pair();
    let (end_b, _keep_b) = pipe_pair();
    ports.add_port(4, Box::new(end_a)).unwrap();
    assert!(matches!(
        ports.add_port(4, Box::new(end_b)),
        Err(PortError::SlotBusy(4))
    ));
    ports.remove_port(4).unwrap();
    let (end_c, _keep_c) = pipe_pair();
    ports.add_port(4, Box::new(end_c)).unwrap();
}

/// The manager moves words between attached devices.
#[test]
fn manager_reads_and_writes_channels() {
    let mut ports = PortManager::new();
    let (mut host_in, sim_in) = pipe_pair();
    let (host_out, sim_out) = pipe_pair();
    ports.add_port(1, Box::new(sim_in)).unwrap();
    ports.add_port(2, Box::new(sim_out)).unwrap();

    host_in.write_word(123).unwrap();
    assert_eq!(ports.read(1).unwrap(), 123);
    ports.write(2, 456).unwrap();
    assert_eq!(host_out.try_read_word(), Some(456));

    ports.teardown();
    assert!(matches!(ports.read(1), Err(PortError::Unconnected(1))));
}
