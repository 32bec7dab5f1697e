//! Bounces messages between two endpoints in the same process.
//!
//! # Usage
//!
//! Two endpoints on `External` devices are connected by moving frames between them. The client
//! sends each message, the server echoes it back and the client waits for the echo before sending
//! the next one.
//!
//!   > $ cargo run --example pingpong -- --count 10000 --size 256
use std::io::{stdout, Write};
use std::time::Instant;
use structopt::StructOpt;

use etcp::layer::{Address, Config as EndpointConfig, ConnOptions, Endpoint, Error, Socket};
use etcp::nic::External;

const SERVER: Address = Address { host: 0x02_00_00_00_00_01, port: 7 };
const CLIENT: Address = Address { host: 0x02_00_00_00_00_02, port: 4000 };

fn main() {
    let Config {
        count,
        size,
        window,
    } = Config::from_args();

    let options = ConnOptions {
        window_log2: window,
        buffer_size: size,
        .. ConnOptions::default()
    };

    let mut server = Endpoint::new(External::new(SERVER.host), EndpointConfig::default())
        .expect("Couldn't create server endpoint");
    let mut client = Endpoint::new(External::new(CLIENT.host), EndpointConfig::default())
        .expect("Couldn't create client endpoint");

    let mut listener = server.socket();
    server.bind(&mut listener, SERVER, options).unwrap();
    server.listen(&listener, 4).unwrap();

    let mut sock = client.socket();
    client.connect(&mut sock, CLIENT, SERVER, options, true).unwrap();

    let out = stdout();
    let mut out = out.lock();

    let message = vec![0x2a; size];
    let mut buffer = vec![0; size];
    let mut link = Link { frames: 0 };
    let mut accepted: Option<Socket> = None;

    let start = Instant::now();
    for round in 0..count {
        send_all(&mut client, &sock, &message);

        let echo = loop {
            link.carry(&mut client, &mut server);

            if accepted.is_none() {
                match server.accept(&listener) {
                    Ok(socket) => accepted = Some(socket),
                    Err(Error::TryAgain) => (),
                    Err(err) => panic!("Accept failed: {}", err),
                }
            }

            if let Some(conn) = &accepted {
                match server.recv(conn, Some(&mut buffer)) {
                    Ok(len) => send_all(&mut server, conn, &buffer[..len]),
                    Err(err) if err.is_retryable() => (),
                    Err(err) => panic!("Server receive failed: {}", err),
                }
            }

            link.carry(&mut server, &mut client);
            match client.recv(&sock, Some(&mut buffer)) {
                Ok(len) => break len,
                Err(err) if err.is_retryable() => (),
                Err(err) => panic!("Client receive failed: {}", err),
            }

            // Flush acknowledgements.
            client.poll_tx().unwrap();
            server.poll_tx().unwrap();
        };

        assert_eq!(echo, size);
        if round % 1000 == 999 {
            out.write_all(b".").unwrap();
            out.flush().unwrap();
        }
    }

    let elapsed = start.elapsed();
    writeln!(out, "\n{} round trips of {} bytes in {:?}, {} frames",
        count, size, elapsed, link.frames).unwrap();

    client.close(sock).unwrap();
    if let Some(conn) = accepted {
        server.close(conn).unwrap();
    }
    server.close(listener).unwrap();
}

fn send_all(endpoint: &mut Endpoint<External>, sock: &Socket, data: &[u8]) {
    loop {
        match endpoint.send(sock, Some(data)) {
            Ok(_) => return,
            Err(Error::TryAgain) => (),
            Err(err) => panic!("Send failed: {}", err),
        }
    }
}

/// Moves frames between the two devices.
struct Link {
    frames: usize,
}

impl Link {
    fn carry(&mut self, from: &mut Endpoint<External>, to: &mut Endpoint<External>) {
        while let Some(frame) = from.device_mut().pop_sent() {
            self.frames += 1;
            to.device_mut().push_recv(frame);
        }
    }
}

#[derive(StructOpt)]
struct Config {
    /// Number of round trips.
    #[structopt(short = "n", long = "count", default_value = "1000")]
    count: usize,
    /// Bytes per message.
    #[structopt(short = "s", long = "size", default_value = "64")]
    size: usize,
    /// Window of each connection, as a power of two.
    #[structopt(short = "w", long = "window", default_value = "6")]
    window: u32,
}
