//! End-to-end session behavior over the mock transport.

use std::sync::Arc;

use meshwire_core::schema::{
    Data, FromRadio, MeshPacket, MyNodeInfo, PortNum, Routing, RoutingError, ToRadio, XModem,
    XModemControl, from_radio, mesh_packet, routing, to_radio,
};
use meshwire_core::{
    Destination, DeviceEvent, DeviceSession, DeviceStatus, MockTransport, PacketOptions,
    QueueError, SessionConfig,
};
use prost::Message;

fn envelope(variant: from_radio::PayloadVariant) -> Vec<u8> {
    FromRadio {
        id: 0,
        payload_variant: Some(variant),
    }
    .encode_to_vec()
}

fn routing_reply(from: u32, request_id: u32, reason: RoutingError) -> Vec<u8> {
    let routing = Routing {
        variant: Some(routing::Variant::ErrorReason(reason as i32)),
    };
    let packet = MeshPacket {
        from,
        to: 0x10,
        id: 9000 + request_id % 1000,
        payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
            portnum: PortNum::RoutingApp as i32,
            payload: routing.encode_to_vec(),
            request_id,
            ..Default::default()
        })),
        ..Default::default()
    };
    envelope(from_radio::PayloadVariant::Packet(packet))
}

fn xmodem_control(control: XModemControl) -> Vec<u8> {
    envelope(from_radio::PayloadVariant::XmodemPacket(XModem {
        control: control as i32,
        ..Default::default()
    }))
}

fn last_packet_id(transport: &MockTransport) -> u32 {
    transport
        .sent_envelopes()
        .into_iter()
        .rev()
        .find_map(|envelope| match envelope.payload_variant {
            Some(to_radio::PayloadVariant::Packet(packet)) => Some(packet.id),
            _ => None,
        })
        .unwrap()
}

fn sent_xmodem(transport: &MockTransport) -> Vec<XModem> {
    transport
        .sent_envelopes()
        .into_iter()
        .filter_map(|envelope| match envelope.payload_variant {
            Some(to_radio::PayloadVariant::XmodemPacket(packet)) => Some(packet),
            _ => None,
        })
        .collect()
}

fn setup(config_id: u32) -> (Arc<MockTransport>, Arc<DeviceSession>) {
    let transport = Arc::new(MockTransport::new());
    let config = SessionConfig {
        config_id: Some(config_id),
        ..Default::default()
    };
    let session = Arc::new(DeviceSession::new(transport.clone(), config));
    (transport, session)
}

#[tokio::test(start_paused = true)]
async fn test_handshake_reaches_configured_once() {
    let (transport, session) = setup(42);
    let mut events = session.subscribe();
    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    session.connect().await.unwrap();
    assert_eq!(transport.sent_envelopes(), vec![ToRadio::want_config(42)]);

    transport.push_inbound(envelope(from_radio::PayloadVariant::MyInfo(MyNodeInfo {
        my_node_num: 0x10,
        ..Default::default()
    })));
    transport.push_inbound(envelope(from_radio::PayloadVariant::ConfigCompleteId(42)));
    transport.push_inbound(envelope(from_radio::PayloadVariant::ConfigCompleteId(42)));
    transport.close_inbound();
    runner.await.unwrap().unwrap();

    assert_eq!(session.my_node_num(), 0x10);
    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DeviceEvent::StatusChanged { to, .. } = event {
            transitions.push(to);
        }
    }
    assert_eq!(
        transitions,
        vec![
            DeviceStatus::Connecting,
            DeviceStatus::Connected,
            DeviceStatus::Configuring,
            DeviceStatus::Configured,
            DeviceStatus::Disconnected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_routing_outcomes_settle_sends() {
    let (transport, session) = setup(1);

    let delivered = session
        .send_text("ping", PacketOptions::to(Destination::Node(0x22)))
        .await
        .unwrap();
    let delivered_id = last_packet_id(&transport);
    assert_eq!(delivered.id(), delivered_id);

    let rejected = session
        .send_text("ping again", PacketOptions::to(Destination::Node(0x22)))
        .await
        .unwrap();
    let rejected_id = last_packet_id(&transport);
    assert_eq!(session.queued_packets(), 2);

    session
        .handle_inbound(&routing_reply(0x22, rejected_id, RoutingError::NoRoute))
        .await
        .unwrap();
    session
        .handle_inbound(&routing_reply(0x22, delivered_id, RoutingError::None))
        .await
        .unwrap();

    assert_eq!(delivered.await, Ok(delivered_id));
    assert_eq!(
        rejected.await,
        Err(QueueError::Rejected {
            id: rejected_id,
            reason: RoutingError::NoRoute,
        })
    );
    assert_eq!(session.queued_packets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_packet_times_out() {
    let (_transport, session) = setup(1);
    let pending = session
        .send_text("anyone?", PacketOptions::default())
        .await
        .unwrap();

    let err = pending.await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(session.queued_packets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_file_upload_walks_chunks() {
    let (transport, session) = setup(1);
    let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

    session.upload_file("notes.txt", &data).await.unwrap();
    for _ in 0..3 {
        session
            .handle_inbound(&xmodem_control(XModemControl::Ack))
            .await
            .unwrap();
    }
    assert!(session.is_uploading());

    let sent = sent_xmodem(&transport);
    let summary: Vec<(i32, u32, usize)> = sent
        .iter()
        .map(|p| (p.control, p.seq, p.buffer.len()))
        .collect();
    let soh = XModemControl::Soh as i32;
    assert_eq!(
        summary,
        vec![
            (soh, 0, 128),
            (soh, 1, 128),
            (soh, 2, 44),
            (XModemControl::Eot as i32, 3, 0),
        ]
    );
    assert_eq!(sent[0].buffer, &data[..128]);
    assert_eq!(sent[2].buffer, &data[256..]);

    // ACK for EOT closes the transfer without another write.
    session
        .handle_inbound(&xmodem_control(XModemControl::Ack))
        .await
        .unwrap();
    assert!(!session.is_uploading());
    assert_eq!(sent_xmodem(&transport).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_file_download_emits_contents() {
    let (transport, session) = setup(1);
    let mut events = session.subscribe();

    session.download_file("/prefs/log.txt").await.unwrap();
    let request = &sent_xmodem(&transport)[0];
    assert_eq!(request.control, XModemControl::Stx as i32);
    assert_eq!(request.buffer, b"/prefs/log.txt");

    for (seq, chunk) in [(1u32, &b"hello "[..]), (2, b"mesh")] {
        let packet = XModem {
            control: XModemControl::Soh as i32,
            seq,
            crc16: u32::from(meshwire_core::xmodem::crc16_ccitt(chunk)),
            buffer: chunk.to_vec(),
        };
        session
            .handle_inbound(&envelope(from_radio::PayloadVariant::XmodemPacket(packet)))
            .await
            .unwrap();
    }
    session
        .handle_inbound(&xmodem_control(XModemControl::Eot))
        .await
        .unwrap();

    let acks = sent_xmodem(&transport)
        .iter()
        .filter(|p| p.control == XModemControl::Ack as i32)
        .count();
    assert_eq!(acks, 2);

    let mut received = None;
    while let Ok(event) = events.try_recv() {
        if let DeviceEvent::FileReceived { data } = event {
            received = Some(data);
        }
    }
    assert_eq!(received.as_deref(), Some(&b"hello mesh"[..]));
}

#[tokio::test(start_paused = true)]
async fn test_settings_transaction_round_trip() {
    let (transport, session) = setup(1);
    let mut events = session.subscribe();

    session
        .set_channel(meshwire_core::schema::Channel::disabled(2))
        .await
        .unwrap();
    assert!(session.pending_settings_change());
    session.commit_edit_settings().await.unwrap();
    assert!(!session.pending_settings_change());
    assert_eq!(transport.sent_envelopes().len(), 3);

    let mut flags = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DeviceEvent::PendingSettingsChange(pending) = event {
            flags.push(pending);
        }
    }
    assert_eq!(flags, vec![true, false]);
}
