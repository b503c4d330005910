use anyhow::Result;
use gtpu::GTPU_G_PDU;
use qupf::data::GateStatus;
use qupf::userplane::{Action, WINDOW_SIZE, counter_indices::*};
use qupf_tests::{framework::*, *};

const MS: u64 = 1_000_000;

fn downlink_frame() -> Vec<u8> {
    ethernet(ETHERTYPE_IPV4, &ipv4_udp(DN_IP, UE_IP, 53, 40000, b"rate limited"))
}

/// A rate at which one `downlink_frame()` takes exactly 1ms to send.
fn one_frame_per_ms() -> u64 {
    downlink_frame().len() as u64 * 8 * 1000
}

fn throttled_session(upf: &TestUpf, rate: u64) {
    upf.install_downlink_session(42);
    upf.sessions.put_qer(1, open_qer(rate));
}

#[test]
fn burst_limited_to_window_then_refilled() -> Result<()> {
    let upf = TestUpf::new();
    throttled_session(&upf, one_frame_per_ms());
    let input = downlink_frame();

    let admitted = (0..20)
        .filter(|_| upf.process_n6(&input).0 == Action::Redirect(N3_IFINDEX))
        .count();
    assert_eq!(admitted as u128, WINDOW_SIZE.as_nanos() / MS as u128);
    assert_eq!(upf.stats.value(ACTION_DROP), 20 - admitted);

    // A refused packet is left as it was.
    assert_eq!(upf.process_n6(&input), (Action::Drop, input.clone()));

    upf.clock.advance_ns(MS);
    assert_eq!(upf.process_n6(&input).0, Action::Redirect(N3_IFINDEX));
    assert_eq!(upf.process_n6(&input).0, Action::Drop);
    Ok(())
}

#[test]
fn closed_gate_refuses_regardless_of_rate() -> Result<()> {
    let upf = TestUpf::new();
    upf.install_downlink_session(42);
    let mut qer = open_qer(u64::MAX);
    qer.dl_gate = GateStatus::Closed;
    upf.sessions.put_qer(1, qer);

    for _ in 0..50 {
        assert_eq!(upf.process_n6(&downlink_frame()).0, Action::Drop);
        upf.clock.advance_ns(100 * MS);
    }
    Ok(())
}

#[test]
fn zero_rate_refuses_everything() -> Result<()> {
    let upf = TestUpf::new();
    throttled_session(&upf, 0);
    for _ in 0..10 {
        assert_eq!(upf.process_n6(&downlink_frame()).0, Action::Drop);
        upf.clock.advance_ns(10 * MS);
    }
    Ok(())
}

#[test]
fn long_run_rate_does_not_exceed_limit() -> Result<()> {
    let upf = TestUpf::new();
    let rate = one_frame_per_ms();
    throttled_session(&upf, rate);
    let input = downlink_frame();

    // Offer a frame every 100us for one second: ten times the limit.
    let mut admitted_bytes = 0u64;
    for _ in 0..10_000 {
        if upf.process_n6(&input).0 == Action::Redirect(N3_IFINDEX) {
            admitted_bytes += input.len() as u64;
        }
        upf.clock.advance_ns(MS / 10);
    }

    let limit_bytes = rate / 8;
    let burst_bytes = rate / 8 * WINDOW_SIZE.as_nanos() as u64 / 1_000_000_000;
    assert!(admitted_bytes <= limit_bytes + burst_bytes, "{admitted_bytes}");
    assert!(admitted_bytes >= limit_bytes * 9 / 10, "{admitted_bytes}");
    Ok(())
}

#[test]
fn directions_are_limited_independently() -> Result<()> {
    let upf = TestUpf::new();
    throttled_session(&upf, one_frame_per_ms());
    upf.install_uplink_session(42);
    upf.sessions.put_qer(1, open_qer(one_frame_per_ms()));

    while upf.process_n6(&downlink_frame()).0 != Action::Drop {}

    let uplink = ethernet(
        ETHERTYPE_IPV4,
        &gtpu(GNB_IP, UPF_N3_IP, GTPU_G_PDU, 42, &ipv4_udp(UE_IP, DN_IP, 1, 2, b"up")),
    );
    assert_eq!(upf.process_n3(&uplink).0, Action::Redirect(N6_IFINDEX));
    Ok(())
}
