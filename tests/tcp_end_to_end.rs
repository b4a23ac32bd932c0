use std::{net::SocketAddr, sync::Arc, time::Duration};

use rmodbus::{client::ModbusRequest, ModbusProto};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use modsim::api::modbus::{
    ByteOrder, DataType, FlumeEventHook, FunctionCode, RegisterMap, RegisterMapEntry,
    ServerEvent, SharedRegisterMap, Simulator, SimulatorBuilder, ValueRange,
};

async fn start(map: SharedRegisterMap) -> (Simulator, SocketAddr) {
    let simulator = SimulatorBuilder::new_tcp("127.0.0.1", 0)
        .with_poll_interval(20)
        .with_register_map(map)
        .start()
        .await
        .unwrap();
    let addr = simulator.local_addr().unwrap();
    (simulator, addr)
}

/// Send one ADU and read back exactly one MBAP-framed response.
async fn exchange(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream.write_all(request).await.unwrap();
    let mut response = vec![0u8; 7];
    stream.read_exact(&mut response).await.unwrap();
    let length = u16::from_be_bytes([response[4], response[5]]) as usize;
    let mut pdu = vec![0u8; length - 1];
    stream.read_exact(&mut pdu).await.unwrap();
    response.extend_from_slice(&pdu);
    response
}

fn entry(
    function: FunctionCode,
    offset: u16,
    data_type: DataType,
    range: ValueRange,
) -> RegisterMapEntry {
    RegisterMapEntry::new(function, offset, data_type, ByteOrder::Abcd, range).unwrap()
}

#[tokio::test]
async fn holding_registers_decode_with_independent_client() {
    let map = RegisterMap::from_entries(vec![
        entry(
            FunctionCode::ReadHoldingRegisters,
            0,
            DataType::Int16Unsigned,
            ValueRange::fixed(100.0),
        ),
        entry(
            FunctionCode::ReadHoldingRegisters,
            1,
            DataType::Float32,
            ValueRange::fixed(1.0),
        ),
    ]);
    let (simulator, addr) = start(map.into()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut request = ModbusRequest::new(1, ModbusProto::TcpUdp);
    let mut raw = Vec::new();
    request.generate_get_holdings(0, 4, &mut raw).unwrap();

    let response = exchange(&mut stream, &raw).await;
    let mut values = Vec::new();
    request.parse_u16(&response, &mut values).unwrap();
    assert_eq!(values, vec![100, 0x3F80, 0x0000, 0]);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn unmapped_coils_read_as_zero() {
    let (simulator, addr) = start(SharedRegisterMap::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = exchange(
        &mut stream,
        &[0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x0A],
    )
    .await;
    assert_eq!(
        response,
        vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x01, 0x01, 0x02, 0x00, 0x00]
    );

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn input_registers_and_discrete_inputs() {
    let map = RegisterMap::from_entries(vec![
        entry(
            FunctionCode::ReadInputRegisters,
            5,
            DataType::Int16Signed,
            ValueRange::fixed(-2.0),
        ),
        RegisterMapEntry::boolean(FunctionCode::ReadDiscreteInputs, 0).unwrap(),
    ]);
    let (simulator, addr) = start(map.into()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut request = ModbusRequest::new(1, ModbusProto::TcpUdp);
    let mut raw = Vec::new();
    request.generate_get_inputs(4, 2, &mut raw).unwrap();
    let response = exchange(&mut stream, &raw).await;
    let mut values = Vec::new();
    request.parse_u16(&response, &mut values).unwrap();
    assert_eq!(values, vec![0, 0xFFFE]);

    let mut request = ModbusRequest::new(1, ModbusProto::TcpUdp);
    let mut raw = Vec::new();
    request.generate_get_discretes(0, 3, &mut raw).unwrap();
    let response = exchange(&mut stream, &raw).await;
    let mut bits = Vec::new();
    request.parse_bool(&response, &mut bits).unwrap();
    assert_eq!(bits.len(), 3);
    assert!(!bits[1] && !bits[2]);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn map_edits_apply_to_the_next_request() {
    let map = SharedRegisterMap::default();
    let (simulator, addr) = start(map.clone()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];

    let before = exchange(&mut stream, &request).await;
    assert_eq!(&before[9..], &[0x00, 0x00][..]);

    map.push(entry(
        FunctionCode::ReadHoldingRegisters,
        0,
        DataType::Int16Unsigned,
        ValueRange::fixed(4660.0),
    ));
    let after = exchange(&mut stream, &request).await;
    assert_eq!(&after[9..], &[0x12, 0x34][..]);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn idle_connection_does_not_block_others() {
    let (simulator, addr) = start(SharedRegisterMap::default()).await;

    // First client stalls halfway through an MBAP header.
    let mut idle = TcpStream::connect(addr).await.unwrap();
    idle.write_all(&[0x00, 0x08, 0x00]).await.unwrap();

    let mut active = TcpStream::connect(addr).await.unwrap();
    let response = tokio::time::timeout(
        Duration::from_secs(2),
        exchange(
            &mut active,
            &[0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01],
        ),
    )
    .await
    .unwrap();
    assert_eq!(
        response,
        vec![0x00, 0x09, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x00]
    );

    // The stalled request completes afterwards on its own connection.
    idle.write_all(&[0x00, 0x06, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01])
        .await
        .unwrap();
    let mut rest = [0u8; 11];
    idle.read_exact(&mut rest).await.unwrap();
    assert_eq!(&rest[..2], &[0x00, 0x08][..]);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn unsupported_function_closes_connection() {
    let (simulator, addr) = start(SharedRegisterMap::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Write single register.
    stream
        .write_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x00, 0x00, 0x01])
        .await
        .unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    // The listener keeps serving new connections.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let response = exchange(
        &mut stream,
        &[0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01],
    )
    .await;
    assert_eq!(response.len(), 11);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let (simulator, addr) = start(SharedRegisterMap::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    exchange(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01],
    )
    .await;

    tokio::time::timeout(Duration::from_secs(2), simulator.shutdown())
        .await
        .unwrap()
        .unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn events_reach_flume_hook() {
    let (hook, events) = FlumeEventHook::new();
    let simulator = SimulatorBuilder::new_tcp("127.0.0.1", 0)
        .with_poll_interval(20)
        .add_hook(Arc::new(hook))
        .start()
        .await
        .unwrap();
    let addr = simulator.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    exchange(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x04, 0x00, 0x0A, 0x00, 0x02],
    )
    .await;
    drop(stream);
    simulator.shutdown().await.unwrap();

    let events: Vec<ServerEvent> = events.drain().collect();
    assert!(matches!(events.first(), Some(ServerEvent::Listening { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, ServerEvent::ConnectionOpened { .. })));
    assert!(events.iter().any(|event| matches!(
        event,
        ServerEvent::RequestServed {
            unit_id: 0x11,
            function: FunctionCode::ReadInputRegisters,
            start: 10,
            quantity: 2,
            ..
        }
    )));
    assert!(matches!(events.last(), Some(ServerEvent::Stopped { .. })));
}
