use anyhow::Result;
use gtpu::GTPU_G_PDU;
use gtpu::headers::GtpuHeader;
use pnet_packet::Packet;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::udp::UdpPacket;
use qupf::data::{GateStatus, OuterHeaderRemoval, SdfFilter, SdfRules};
use qupf::userplane::Action;
use qupf_tests::{framework::*, *};

/// Downlink session whose PDR sends TCP port 80 through FAR 2 / QER 2 (TEID 77) instead of
/// FAR 1 / QER 1 (TEID 42).
fn web_session(upf: &TestUpf) -> Result<()> {
    upf.install_downlink_session(42);
    let mut downlink = pdr(1, 1);
    downlink.sdf = Some(SdfRules {
        filter: "permit out tcp from any to assigned 80".parse()?,
        far_id: 2,
        qer_id: 2,
        outer_header_removal: None,
    });
    upf.sessions.put_pdr_downlink_v4(UE_IP, downlink);
    upf.sessions.put_far(2, gtpu_far(77, GNB_IP));
    upf.sessions.put_qer(2, open_qer(UNTHROTTLED));
    Ok(())
}

fn tunnel_teid(frame: &[u8]) -> u32 {
    let ip = ipv4_of(frame);
    let udp = UdpPacket::new(ipv4_payload(&ip)).unwrap();
    GtpuHeader::new(udp.payload()).unwrap().teid()
}

#[test]
fn matching_packet_uses_sdf_rules() -> Result<()> {
    let upf = TestUpf::new();
    web_session(&upf)?;
    let input = ethernet(ETHERTYPE_IPV4, &ipv4_tcp(DN_IP, UE_IP, 50000, 80));

    let (action, output) = upf.process_n6(&input);
    assert_eq!(action, Action::Redirect(N3_IFINDEX));
    assert_eq!(tunnel_teid(&output), 77);
    Ok(())
}

#[test]
fn non_matching_packet_uses_pdr_rules() -> Result<()> {
    let upf = TestUpf::new();
    web_session(&upf)?;
    for input in [
        ethernet(ETHERTYPE_IPV4, &ipv4_tcp(DN_IP, UE_IP, 50000, 443)),
        ethernet(ETHERTYPE_IPV4, &ipv4_udp(DN_IP, UE_IP, 50000, 80, b"not tcp")),
    ] {
        let (action, output) = upf.process_n6(&input);
        assert_eq!(action, Action::Redirect(N3_IFINDEX));
        assert_eq!(tunnel_teid(&output), 42);
    }
    Ok(())
}

#[test]
fn sdf_qer_applies_only_to_matching_traffic() -> Result<()> {
    let upf = TestUpf::new();
    web_session(&upf)?;
    let mut qer = open_qer(UNTHROTTLED);
    qer.dl_gate = GateStatus::Closed;
    upf.sessions.put_qer(2, qer);

    let web = ethernet(ETHERTYPE_IPV4, &ipv4_tcp(DN_IP, UE_IP, 50000, 80));
    assert_eq!(upf.process_n6(&web), (Action::Drop, web.clone()));
    let other = ethernet(ETHERTYPE_IPV4, &ipv4_tcp(DN_IP, UE_IP, 50000, 8080));
    assert_eq!(upf.process_n6(&other).0, Action::Redirect(N3_IFINDEX));
    Ok(())
}

#[test]
fn truncated_transport_header_uses_pdr_rules() -> Result<()> {
    let upf = TestUpf::new();
    web_session(&upf)?;
    // Only the ports of the TCP header are present.
    let segment = [0xc3, 0x50, 0x00, 0x50];
    let input = ethernet(
        ETHERTYPE_IPV4,
        &ipv4(DN_IP, UE_IP, IpNextHeaderProtocols::Tcp, &segment),
    );

    let (action, output) = upf.process_n6(&input);
    assert_eq!(action, Action::Redirect(N3_IFINDEX));
    assert_eq!(tunnel_teid(&output), 42);
    Ok(())
}

#[test]
fn uplink_filter_applies_to_tunnelled_packet() -> Result<()> {
    let upf = TestUpf::new();
    upf.install_uplink_session(42);
    let mut uplink = pdr(2, 1);
    uplink.outer_header_removal = Some(OuterHeaderRemoval::GtpUUdpIpv4);
    uplink.sdf = Some(SdfRules {
        filter: "permit out udp from 10.0.0.0/24 to any 53".parse()?,
        far_id: 3,
        qer_id: 1,
        outer_header_removal: None,
    });
    upf.sessions.put_pdr_uplink(42, uplink);
    upf.sessions.put_far(3, gtpu_far(88, PEER_UPF_IP));

    let dns = ipv4_udp(UE_IP, DN_IP, 40000, 53, b"query");
    let frame = ethernet(ETHERTYPE_IPV4, &gtpu(GNB_IP, UPF_N3_IP, GTPU_G_PDU, 42, &dns));
    let (action, output) = upf.process_n3(&frame);
    assert_eq!(action, Action::Redirect(N3_IFINDEX));
    assert_eq!(ipv4_of(&output).get_destination(), PEER_UPF_IP);
    assert_eq!(tunnel_teid(&output), 88);

    let web = ipv4_udp(UE_IP, DN_IP, 40000, 443, b"quic");
    let frame = ethernet(ETHERTYPE_IPV4, &gtpu(GNB_IP, UPF_N3_IP, GTPU_G_PDU, 42, &web));
    let (action, output) = upf.process_n3(&frame);
    assert_eq!(action, Action::Redirect(N6_IFINDEX));
    assert_eq!(&output[14..], &web[..]);
    Ok(())
}

#[test]
fn match_all_udp_filter_matches_every_udp_packet() -> Result<()> {
    let filter: SdfFilter = "permit out udp from 0.0.0.0/0 0-65535 to 0.0.0.0/0 0-65535".parse()?;
    for (src_port, dst_port) in [(0, 0), (1, 65535), (2152, 2152), (65535, 53)] {
        let packet = ipv4_udp(UE_IP, DN_IP, src_port, dst_port, b"");
        let tuple = gtpu::FiveTuple::extract(&packet)?;
        assert!(filter.matches(&tuple));
        assert!(filter.matches(&tuple));
    }
    let tcp = gtpu::FiveTuple::extract(&ipv4_tcp(UE_IP, DN_IP, 1, 2))?;
    assert!(!filter.matches(&tcp));
    Ok(())
}

#[test]
fn repeated_classification_is_stable() -> Result<()> {
    let upf = TestUpf::new();
    web_session(&upf)?;
    let input = ethernet(ETHERTYPE_IPV4, &ipv4_tcp(DN_IP, UE_IP, 50000, 80));
    let first = upf.process_n6(&input);
    for _ in 0..20 {
        assert_eq!(upf.process_n6(&input), first);
    }
    Ok(())
}

#[test]
fn uplink_filter_without_removal_still_decapsulates() -> Result<()> {
    let upf = TestUpf::new();
    upf.install_uplink_session(42);
    let mut uplink = pdr(2, 1);
    uplink.outer_header_removal = Some(OuterHeaderRemoval::GtpUUdpIpv4);
    uplink.sdf = Some(SdfRules {
        filter: "permit out udp from any to any".parse()?,
        far_id: 2,
        qer_id: 1,
        outer_header_removal: None,
    });
    upf.sessions.put_pdr_uplink(42, uplink);

    let inner = ipv4_udp(UE_IP, DN_IP, 40000, 53, b"query");
    let frame = ethernet(ETHERTYPE_IPV4, &gtpu(GNB_IP, UPF_N3_IP, GTPU_G_PDU, 42, &inner));
    let (action, output) = upf.process_n3(&frame);
    assert_eq!(action, Action::Redirect(N6_IFINDEX));
    assert_eq!(&output[14..], &inner[..]);
    Ok(())
}
