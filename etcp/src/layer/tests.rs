use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use super::control::{Order, RxDecision, TxDecision, TxQueues, RxQueues};
use crate::nic::External;
use crate::wire::{Body, FrameRepr, MessageType};

const HOST_A: u64 = 0xa;
const HOST_B: u64 = 0xb;

fn server_addr() -> Address {
    Address::new(HOST_A, 1000)
}

fn client_addr() -> Address {
    Address::new(HOST_B, 2000)
}

fn options() -> ConnOptions {
    ConnOptions { window_log2: 3, buffer_size: 64, .. ConnOptions::default() }
}

fn endpoint(host: u64) -> Endpoint<External> {
    endpoint_with(host, Config::default())
}

fn endpoint_with(host: u64, config: Config) -> Endpoint<External> {
    Endpoint::new(External::new(host), config).unwrap()
}

/// Move all frames sent by `from` to `to`.
fn exchange(from: &mut Endpoint<External>, to: &mut Endpoint<External>) -> usize {
    from.device_mut().deliver_to(to.device_mut())
}

fn listener(server: &mut Endpoint<External>, backlog_log2: u32) -> Socket {
    let mut sock = server.socket();
    server.bind(&mut sock, server_addr(), options()).unwrap();
    server.listen(&sock, backlog_log2).unwrap();
    sock
}

fn client(host: &mut Endpoint<External>, src: Address) -> Socket {
    let mut sock = host.socket();
    host.connect(&mut sock, src, server_addr(), options(), true).unwrap();
    sock
}

/// A server socket on host A accepted from a client socket on host B.
///
/// The first segment was received and its acknowledgement processed by the client.
fn connected() -> (Endpoint<External>, Endpoint<External>, Socket, Socket) {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 2);
    let sock = client(&mut b, client_addr());

    assert_eq!(b.send(&sock, Some(b"hello")), Ok(5));
    assert_eq!(exchange(&mut b, &mut a), 1);
    let server = a.accept(&listen).unwrap();

    let mut buffer = [0; 64];
    assert_eq!(a.recv(&server, Some(&mut buffer)), Ok(5));
    assert_eq!(&buffer[..5], b"hello");

    assert_eq!(exchange(&mut a, &mut b), 1);
    assert_eq!(b.poll_rx(), Ok(1));
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(in_flight(&b, &FourTuple::new(client_addr(), server_addr())), 0);

    (a, b, server, sock)
}

fn in_flight(endpoint: &Endpoint<External>, tuple: &FourTuple) -> usize {
    endpoint.flows.connection(tuple).unwrap().in_flight()
}

fn recv_string(endpoint: &mut Endpoint<External>, sock: &Socket) -> Result<String> {
    let mut buffer = [0; 64];
    let len = endpoint.recv(sock, Some(&mut buffer))?;
    Ok(String::from_utf8_lossy(&buffer[..len]).into_owned())
}

#[test]
fn bind_conflict() {
    let mut a = endpoint(HOST_A);
    let mut first = a.socket();
    a.bind(&mut first, server_addr(), options()).unwrap();

    let mut second = a.socket();
    assert_eq!(a.bind(&mut second, server_addr(), options()), Err(Error::AlreadyBound));
    assert_eq!(second.kind(), SocketKind::Unknown);
    assert_eq!(first.kind(), SocketKind::ListenAccept { destination: server_addr() });

    // A socket is bound only once.
    assert_eq!(a.bind(&mut first, Address::new(HOST_A, 1001), options()), Err(Error::WrongSocket));

    a.listen(&first, 2).unwrap();
    assert_eq!(a.listen(&first, 2), Err(Error::AlreadyListening));
    assert_eq!(a.listen(&second, 2), Err(Error::WrongSocket));

    // The destination is free again after closing.
    a.close(first).unwrap();
    a.bind(&mut second, server_addr(), options()).unwrap();
}

#[test]
fn bad_options() {
    let mut a = endpoint(HOST_A);
    let mut sock = a.socket();
    let huge = ConnOptions { buffer_size: 9000, .. options() };
    assert_eq!(a.bind(&mut sock, server_addr(), huge), Err(Error::OutOfRange));

    let wide = ConnOptions { window_log2: ConnOptions::MAX_WINDOW_LOG2 + 1, .. options() };
    assert_eq!(a.connect(&mut sock, client_addr(), server_addr(), wide, false), Err(Error::OutOfRange));
    assert_eq!(sock.kind(), SocketKind::Unknown);

    a.bind(&mut sock, server_addr(), options()).unwrap();
    assert_eq!(a.listen(&sock, 17), Err(Error::OutOfRange));
}

#[test]
fn connect_return_path() {
    let mut b = endpoint(HOST_B);
    let sock = client(&mut b, client_addr());

    let forward = FourTuple::new(client_addr(), server_addr());
    assert!(b.has_connection(&forward));
    assert!(b.has_connection(&forward.swapped()));
    assert_eq!(sock.send_flow(), Some(forward));
    assert_eq!(sock.recv_flow(), Some(forward.swapped()));

    let mut one_way = b.socket();
    let src = Address::new(HOST_B, 2001);
    b.connect(&mut one_way, src, server_addr(), options(), false).unwrap();
    let tuple = FourTuple::new(src, server_addr());
    assert!(b.has_connection(&tuple));
    assert!(!b.has_connection(&tuple.swapped()));
    assert_eq!(one_way.recv_flow(), None);
    assert_eq!(b.recv(&one_way, None), Err(Error::NotConnected));

    // Same flow again.
    let mut duplicate = b.socket();
    assert_eq!(
        b.connect(&mut duplicate, src, server_addr(), options(), false),
        Err(Error::AlreadyConnected));
    assert_eq!(duplicate.kind(), SocketKind::Unknown);
}

#[test]
fn connect_is_transactional() {
    let mut b = endpoint(HOST_B);

    // Occupies the flow the return path of the second socket needs.
    let mut blocker = b.socket();
    b.connect(&mut blocker, server_addr(), client_addr(), options(), false).unwrap();

    let mut sock = b.socket();
    assert_eq!(
        b.connect(&mut sock, client_addr(), server_addr(), options(), true),
        Err(Error::AlreadyConnected));
    assert_eq!(sock.kind(), SocketKind::Unknown);

    let forward = FourTuple::new(client_addr(), server_addr());
    assert!(!b.has_connection(&forward));
    assert!(b.has_connection(&forward.swapped()));

    b.close(blocker).unwrap();
    b.connect(&mut sock, client_addr(), server_addr(), options(), true).unwrap();
    assert!(b.has_connection(&forward));
}

#[test]
fn accept_empty_backlog() {
    let mut a = endpoint(HOST_A);
    let mut bound = a.socket();
    a.bind(&mut bound, server_addr(), options()).unwrap();
    assert_eq!(a.accept(&bound), Err(Error::WrongSocket));

    a.listen(&bound, 2).unwrap();
    assert_eq!(a.accept(&bound), Err(Error::TryAgain));
    assert_eq!(a.accept(&bound), Err(Error::TryAgain));

    let unknown = a.socket();
    assert_eq!(a.accept(&unknown), Err(Error::WrongSocket));
}

#[test]
fn admission() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 2);
    let sock = client(&mut b, client_addr());

    assert_eq!(b.send(&sock, Some(b"hello")), Ok(5));
    assert_eq!(exchange(&mut b, &mut a), 1);

    let server = a.accept(&listen).unwrap();
    let flow = FourTuple::new(client_addr(), server_addr());
    assert_eq!(server.kind(), SocketKind::SendReceive {
        send: Some(flow.swapped()),
        recv: Some(flow),
    });
    assert_eq!(a.accept(&listen), Err(Error::TryAgain));

    let mut late = a.socket();
    assert_eq!(a.bind(&mut late, server_addr(), options()), Err(Error::AlreadyBound));

    assert_eq!(recv_string(&mut a, &server).unwrap(), "hello");
}

#[test]
fn admission_without_return_path() {
    let config = Config { accept_return_path: false, .. Config::default() };
    let mut a = endpoint_with(HOST_A, config);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 2);
    let sock = client(&mut b, client_addr());

    b.send(&sock, Some(b"hello")).unwrap();
    exchange(&mut b, &mut a);
    let server = a.accept(&listen).unwrap();
    assert_eq!(server.send_flow(), None);
    assert_eq!(a.send(&server, Some(b"no")), Err(Error::NotConnected));
    assert_eq!(recv_string(&mut a, &server).unwrap(), "hello");
}

#[test]
fn backlog_full_rejects() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 0);

    let first = client(&mut b, client_addr());
    let second_addr = Address::new(HOST_B, 2001);
    let second = client(&mut b, second_addr);
    b.send(&first, Some(b"1")).unwrap();
    b.send(&second, Some(b"2")).unwrap();
    assert_eq!(exchange(&mut b, &mut a), 2);

    assert_eq!(a.poll_rx(), Ok(1));
    assert!(!a.has_connection(&FourTuple::new(second_addr, server_addr())));

    let server = a.accept(&listen).unwrap();
    assert_eq!(server.recv_flow(), Some(FourTuple::new(client_addr(), server_addr())));
    assert_eq!(a.accept(&listen), Err(Error::TryAgain));
}

#[test]
fn admission_unwinds() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 0);

    // Occupies the return path of the admitted flow.
    let mut blocker = a.socket();
    a.connect(&mut blocker, server_addr(), client_addr(), options(), false).unwrap();

    let sock = client(&mut b, client_addr());
    b.send(&sock, Some(b"hello")).unwrap();
    let frame = b.device_mut().pop_sent().unwrap();

    a.device_mut().push_recv(frame.clone());
    assert_eq!(a.poll_rx(), Ok(0));
    let flow = FourTuple::new(client_addr(), server_addr());
    assert!(!a.has_connection(&flow));
    assert_eq!(a.accept(&listen), Err(Error::TryAgain));

    // The abandoned backlog slot is available again.
    a.close(blocker).unwrap();
    a.device_mut().push_recv(frame);
    let server = a.accept(&listen).unwrap();
    assert_eq!(server.recv_flow(), Some(flow));
    assert!(a.has_connection(&flow.swapped()));
}

#[test]
fn transfer_and_close() {
    let (mut a, mut b, server, sock) = connected();

    for &message in &[&b"one"[..], b"two", b"three"] {
        assert_eq!(b.send(&sock, Some(message)), Ok(message.len()));
    }
    assert_eq!(exchange(&mut b, &mut a), 3);

    assert_eq!(recv_string(&mut a, &server).unwrap(), "one");
    assert_eq!(recv_string(&mut a, &server).unwrap(), "two");
    assert_eq!(recv_string(&mut a, &server).unwrap(), "three");
    assert_eq!(recv_string(&mut a, &server), Err(Error::TryAgain));

    // The reverse direction, together with the acknowledgement of the three segments.
    assert_eq!(a.send(&server, Some(b"pong")), Ok(4));
    assert_eq!(exchange(&mut a, &mut b), 2);
    assert_eq!(recv_string(&mut b, &sock).unwrap(), "pong");

    let forward = FourTuple::new(client_addr(), server_addr());
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(in_flight(&b, &forward), 0);

    b.close(sock).unwrap();
    assert!(!b.has_connection(&forward));
    assert!(!b.has_connection(&forward.swapped()));

    exchange(&mut b, &mut a);
    assert_eq!(recv_string(&mut a, &server), Err(Error::NotConnected));
    assert_eq!(a.send(&server, None), Ok(0));
    assert_eq!(in_flight(&a, &forward.swapped()), 0);

    a.close(server).unwrap();
    assert!(!a.has_connection(&forward));
}

#[test]
fn truncated_send() {
    let (mut a, mut b, server, sock) = connected();
    assert_eq!(b.send(&sock, Some(&[0x42; 100])), Ok(64));
    exchange(&mut b, &mut a);

    let mut buffer = [0; 16];
    assert_eq!(a.recv(&server, Some(&mut buffer)), Ok(16));
    assert_eq!(buffer, [0x42; 16]);
}

#[test]
fn full_window_is_backpressure() {
    let (_, mut b, _, sock) = connected();
    for _ in 0..8 {
        assert_eq!(b.send(&sock, Some(b"x")), Ok(1));
    }

    let err = b.send(&sock, Some(b"x")).unwrap_err();
    assert_eq!(err, Error::TryAgain);
    assert!(err.is_retryable());
}

#[test]
fn lost_segment_is_retransmitted() {
    let (mut a, mut b, server, sock) = connected();
    for &message in &[&b"one"[..], b"two", b"three"] {
        b.send(&sock, Some(message)).unwrap();
    }

    // Lose the segment `two`.
    let one = b.device_mut().pop_sent().unwrap();
    b.device_mut().pop_sent().unwrap();
    a.device_mut().push_recv(one);
    exchange(&mut b, &mut a);

    assert_eq!(recv_string(&mut a, &server).unwrap(), "one");
    assert_eq!(recv_string(&mut a, &server).unwrap(), "three");

    exchange(&mut a, &mut b);
    assert_eq!(b.poll_rx(), Ok(1));
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(in_flight(&b, &FourTuple::new(client_addr(), server_addr())), 1);

    let frame = b.device_mut().pop_sent().unwrap();
    let repr = FrameRepr::parse(&frame.payload).unwrap();
    match repr.body {
        Body::Data(data) => {
            assert_eq!(data.seq, 2);
            assert_eq!(data.attempts, 2);
        },
        other => panic!("Unexpected body {:?}", other),
    }

    a.device_mut().push_recv(frame);
    assert_eq!(recv_string(&mut a, &server).unwrap(), "two");
}

#[test]
fn stale_segment_is_acknowledged_again() {
    let (mut a, mut b, server, sock) = connected();
    b.send(&sock, Some(b"x")).unwrap();
    let frame = b.device_mut().pop_sent().unwrap();

    a.device_mut().push_recv(frame.clone());
    assert_eq!(recv_string(&mut a, &server).unwrap(), "x");
    while a.device_mut().pop_sent().is_some() { }

    // A retransmission of an acknowledged segment.
    a.device_mut().push_recv(frame);
    assert_eq!(recv_string(&mut a, &server), Err(Error::TryAgain));

    let ack = a.device_mut().pop_sent().unwrap();
    let repr = FrameRepr::parse(&ack.payload).unwrap();
    assert_eq!(repr.header.kind, MessageType::Ack);
    match repr.body {
        Body::Sack(sack) => {
            assert_eq!(sack.base_seq, 1);
            assert_eq!(sack.fields().len(), 1);
        },
        other => panic!("Unexpected body {:?}", other),
    }
}

#[test]
fn refused_flow_is_denied() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);

    // Bound but not listening.
    let mut bound = a.socket();
    a.bind(&mut bound, server_addr(), options()).unwrap();

    let sock = client(&mut b, client_addr());
    b.send(&sock, Some(b"hi")).unwrap();
    exchange(&mut b, &mut a);
    assert_eq!(a.poll_rx(), Ok(0));
    assert_eq!(a.device().to_send(), 1);

    exchange(&mut a, &mut b);
    assert_eq!(b.poll_rx(), Ok(1));
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(b.send(&sock, Some(b"again")), Err(Error::NotConnected));
}

#[test]
fn unknown_destination_is_dropped() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);
    let sock = client(&mut b, client_addr());
    b.send(&sock, Some(b"hi")).unwrap();
    exchange(&mut b, &mut a);

    assert_eq!(a.poll_rx(), Ok(0));
    assert_eq!(a.device().to_send(), 0);
}

#[test]
fn polled_receive() {
    let config = Config { event_triggered_rx: false, .. Config::default() };
    let mut a = endpoint_with(HOST_A, config);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 2);
    let sock = client(&mut b, client_addr());

    b.send(&sock, Some(b"hello")).unwrap();
    exchange(&mut b, &mut a);
    assert_eq!(a.accept(&listen), Err(Error::TryAgain));

    assert_eq!(a.poll_rx(), Ok(1));
    let server = a.accept(&listen).unwrap();
    assert_eq!(recv_string(&mut a, &server).unwrap(), "hello");
}

#[test]
fn polled_transmit_with_limits() {
    let config = Config { event_triggered_tx: false, .. Config::default() };
    let mut b = endpoint_with(HOST_B, config);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let record = seen.clone();
    b.set_tx_control(FnHandler(move |queues: &TxQueues| {
        record.borrow_mut().push(queues.send_tx.map(|state| state.readable));
        TxDecision {
            order: Order::DataFirst,
            max_acks: None,
            max_data: Some(1),
        }
    }));

    let sock = client(&mut b, client_addr());
    for _ in 0..3 {
        b.send(&sock, Some(b"x")).unwrap();
    }
    assert_eq!(b.device().to_send(), 0);

    assert_eq!(b.poll_tx(), Ok(1));
    assert_eq!(b.poll_tx(), Ok(1));
    assert_eq!(b.device().to_send(), 2);

    // Decisions for the send and the receive connection in each poll.
    let seen = seen.borrow();
    assert!(seen.contains(&Some(3)));
    assert!(seen.contains(&Some(2)));
    assert!(seen.contains(&None));
}

#[test]
fn full_ack_queue_still_delivers() {
    let config = Config { event_triggered_tx: false, .. Config::default() };
    let mut a = endpoint_with(HOST_A, config);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 2);
    let mut sock = b.socket();
    let wide = ConnOptions { window_log2: 5, .. options() };
    b.connect(&mut sock, client_addr(), server_addr(), wide, true).unwrap();
    let flow = FourTuple::new(client_addr(), server_addr());

    let mut server = None;
    for letter in b'a'..b'm' {
        assert_eq!(b.send(&sock, Some(&[letter])), Ok(1));
        assert_eq!(exchange(&mut b, &mut a), 1);
        if server.is_none() {
            server = Some(a.accept(&listen).unwrap());
        }
        let conn = server.as_ref().unwrap();
        assert_eq!(recv_string(&mut a, conn).unwrap(), (letter as char).to_string());
    }
    let server = server.unwrap();

    // Only the first eight acknowledgements fit into the queue.
    assert_eq!(a.device().to_send(), 0);
    assert_eq!(a.poll_tx(), Ok(8));
    assert_eq!(exchange(&mut a, &mut b), 8);
    assert_eq!(b.poll_rx(), Ok(8));
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(in_flight(&b, &flow), 4);

    // Acknowledging a later segment makes the client send the others again.
    assert_eq!(b.send(&sock, Some(b"m")), Ok(1));
    assert_eq!(exchange(&mut b, &mut a), 1);
    assert_eq!(recv_string(&mut a, &server).unwrap(), "m");
    assert_eq!(a.poll_tx(), Ok(1));
    assert_eq!(exchange(&mut a, &mut b), 1);
    assert_eq!(b.poll_rx(), Ok(1));
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(in_flight(&b, &flow), 4);
    assert_eq!(b.device().to_send(), 4);

    // They were delivered already and are acknowledged as stale.
    assert_eq!(exchange(&mut b, &mut a), 4);
    assert_eq!(recv_string(&mut a, &server), Err(Error::TryAgain));
    assert_eq!(a.poll_tx(), Ok(1));
    assert_eq!(exchange(&mut a, &mut b), 1);
    assert_eq!(b.poll_rx(), Ok(1));
    assert_eq!(b.send(&sock, None), Ok(0));
    assert_eq!(in_flight(&b, &flow), 0);
}

#[test]
fn full_receive_queue_still_delivers() {
    let (mut a, mut b, server, sock) = connected();
    for letter in b'a'..b'i' {
        assert_eq!(b.send(&sock, Some(&[letter])), Ok(1));
    }
    assert_eq!(exchange(&mut b, &mut a), 8);
    assert_eq!(a.poll_rx(), Ok(8));

    let flow = FourTuple::new(client_addr(), server_addr());
    assert_eq!(a.flows.connection(&flow).unwrap().rx_state().available, 0);
    for letter in b'a'..b'i' {
        assert_eq!(recv_string(&mut a, &server).unwrap(), (letter as char).to_string());
    }
    assert_eq!(recv_string(&mut a, &server), Err(Error::TryAgain));
}

#[test]
fn acknowledgements_can_be_held_back() {
    let (mut a, mut b, server, sock) = connected();
    a.set_rx_control(FnHandler(|_: &RxQueues| RxDecision {
        max_ack_slots: Some(0),
        .. RxDecision::default()
    }));

    b.send(&sock, Some(b"quiet")).unwrap();
    exchange(&mut b, &mut a);
    assert_eq!(recv_string(&mut a, &server).unwrap(), "quiet");
    assert_eq!(a.device().to_send(), 0);
}

#[test]
fn sockets_belong_to_their_endpoint() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);

    let mut foreign = a.socket();
    assert_eq!(b.bind(&mut foreign, server_addr(), options()), Err(Error::WrongSocket));
    assert_eq!(b.close(foreign), Err(Error::WrongSocket));

    let sock = client(&mut b, client_addr());
    assert_eq!(a.send(&sock, Some(b"x")), Err(Error::WrongSocket));
    assert_eq!(a.recv(&sock, None), Err(Error::WrongSocket));
}

#[test]
fn close_listener_with_pending() {
    let mut a = endpoint(HOST_A);
    let mut b = endpoint(HOST_B);
    let listen = listener(&mut a, 2);
    let sock = client(&mut b, client_addr());

    b.send(&sock, Some(b"hello")).unwrap();
    exchange(&mut b, &mut a);
    assert_eq!(a.poll_rx(), Ok(1));

    let flow = FourTuple::new(client_addr(), server_addr());
    assert!(a.has_connection(&flow));
    a.close(listen).unwrap();
    assert!(!a.has_connection(&flow));
    assert!(!a.has_connection(&flow.swapped()));

    let mut again = a.socket();
    a.bind(&mut again, server_addr(), options()).unwrap();
}

#[test]
fn teardown_returns_device() {
    let (a, _, _, _) = connected();
    let device = a.into_device();
    assert_eq!(device.address(), HOST_A);
}

#[test]
fn retryable_errors() {
    assert!(Error::TryAgain.is_retryable());
    assert!(Error::Rejected.is_retryable());
    assert!(!Error::AlreadyBound.is_retryable());
    assert!(!Error::Exhausted.is_retryable());
    assert_eq!(format!("{}", Error::NotConnected), "not connected");
}
