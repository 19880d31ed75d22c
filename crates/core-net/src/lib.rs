//! UDP ingress and batch receive loop (spec component C5).
//!
//! Owns the socket exclusively; every received datagram is parsed and
//! handed to a `core_ddp::Assembler` on the same thread. Runs until told
//! to stop, batching up to `batch_limit` datagrams per wakeup before
//! calling the assembler's expiry scan.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use core_ddp::{Assembler, IngestOutcome, parse_header};
use core_telemetry::Counters;

/// Datagrams this large or larger than a DDP header can't possibly be
/// valid; sized generously above any realistic DDP chunk.
const RECV_BUF_LEN: usize = 65_536;
/// Requested via `SO_RCVBUF`; best-effort per spec §4.5.
const RECV_BUFFER_HINT_BYTES: i32 = 4 * 1024 * 1024;
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Binds a non-blocking UDP socket and widens its receive buffer on a
/// best-effort basis. Failure to widen the buffer is logged and never
/// fatal (spec §4.5, §7 "best-effort, log and continue").
pub fn bind(host: &str, port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind((host, port))?;
    socket.set_nonblocking(true)?;
    widen_receive_buffer(&socket);
    Ok(socket)
}

#[cfg(unix)]
fn widen_receive_buffer(socket: &UdpSocket) {
    use std::os::unix::io::AsRawFd;
    let fd = socket.as_raw_fd();
    let size = RECV_BUFFER_HINT_BYTES;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const i32 as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            "so_rcvbuf_hint_failed"
        );
    }
}

#[cfg(not(unix))]
fn widen_receive_buffer(_socket: &UdpSocket) {}

/// Drives the receive loop: batch-drain the socket, feed each datagram to
/// the assembler, then run the expiry scan (spec §4.5).
pub struct Receiver {
    socket: UdpSocket,
    assembler: Assembler,
    counters: Arc<Counters>,
    batch_limit: usize,
    buf: [u8; RECV_BUF_LEN],
}

impl Receiver {
    pub fn new(
        socket: UdpSocket,
        assembler: Assembler,
        counters: Arc<Counters>,
        batch_limit: usize,
    ) -> Self {
        Self {
            socket,
            assembler,
            counters,
            batch_limit,
            buf: [0u8; RECV_BUF_LEN],
        }
    }

    /// Run until `stop` is set. Each iteration drains up to `batch_limit`
    /// datagrams, expires stale active assemblies, then sleeps briefly if
    /// no work was available (spec §4.5, §5 "C5 owns the socket fd").
    pub fn run(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            let drained = self.drain_batch();
            let expired = self.assembler.expire(Instant::now());
            self.counters.record_incomplete_n(expired as u64);
            if drained == 0 {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    fn drain_batch(&mut self) -> usize {
        let mut drained = 0;
        while drained < self.batch_limit {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, addr)) => {
                    drained += 1;
                    self.handle_datagram(addr, len);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(error = %err, "udp_recv_failed");
                    break;
                }
            }
        }
        drained
    }

    fn handle_datagram(&mut self, sender: SocketAddr, len: usize) {
        self.counters.record_packet();
        let datagram = &self.buf[..len];
        let (header, payload) = match parse_header(datagram) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(%sender, error = %err, "ddp_header_rejected");
                return;
            }
        };

        let result = self.assembler.ingest(sender, &header, payload, Instant::now());
        if result.evicted_active {
            self.counters.record_incomplete();
        }
        match result.outcome {
            IngestOutcome::Accepted => {}
            IngestOutcome::Completed => {
                self.counters.record_frame_in();
            }
            IngestOutcome::CompletedQueueOverflowed => {
                self.counters.record_frame_in();
                self.counters.record_drops(1);
            }
            IngestOutcome::OffsetOverflow => {
                tracing::debug!(%sender, "ddp_offset_overflow");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ddp::completed_queue;
    use std::net::Ipv4Addr;

    fn raw_packet(seq: u8, offset: u32, push: bool, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0x41, if push { 0x01 } else { 0x00 }, seq];
        p.push((offset >> 16) as u8);
        p.push((offset >> 8) as u8);
        p.push(offset as u8);
        let len = payload.len() as u16;
        p.push((len >> 8) as u8);
        p.push(len as u8);
        p.push(0);
        p.push(0);
        p.extend_from_slice(payload);
        p
    }

    #[test]
    fn bind_produces_nonblocking_socket() {
        let socket = bind("127.0.0.1", 0).unwrap();
        assert!(socket.local_addr().is_ok());
    }

    #[test]
    fn drain_batch_feeds_assembler_and_counts_packets() {
        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let recv_socket = bind("127.0.0.1", 0).unwrap();
        let target = recv_socket.local_addr().unwrap();

        let payload = vec![1, 2, 3, 4, 5, 6];
        let raw = raw_packet(9, 0, true, &payload);
        sender.send_to(&raw, target).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let (tx, rx) = completed_queue(50);
        let assembler = Assembler::new(6, 12, Duration::from_millis(100), tx);
        let counters = Counters::new();
        let mut receiver = Receiver::new(recv_socket, assembler, Arc::clone(&counters), 10);

        let drained = receiver.drain_batch();
        assert_eq!(drained, 1);
        let snapshot = counters.take_snapshot();
        assert_eq!(snapshot.packets, 1);
        assert_eq!(snapshot.frames_in, 1);
        let (frame, _) = rx.drain_latest().unwrap();
        assert_eq!(frame.buffer, payload);
    }

    #[test]
    fn drain_batch_returns_zero_when_socket_is_empty() {
        let recv_socket = bind("127.0.0.1", 0).unwrap();
        let (tx, _rx) = completed_queue(50);
        let assembler = Assembler::new(6, 12, Duration::from_millis(100), tx);
        let counters = Counters::new();
        let mut receiver = Receiver::new(recv_socket, assembler, counters, 10);
        assert_eq!(receiver.drain_batch(), 0);
    }

    #[test]
    fn run_counts_expired_frames_as_incomplete() {
        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let recv_socket = bind("127.0.0.1", 0).unwrap();
        let target = recv_socket.local_addr().unwrap();

        // A chunk with no PUSH flag never completes its frame on its own.
        let raw = raw_packet(1, 0, false, &[1, 2, 3]);
        sender.send_to(&raw, target).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let (tx, _rx) = completed_queue(50);
        let assembler = Assembler::new(6, 12, Duration::from_millis(1), tx);
        let counters = Counters::new();
        let mut receiver = Receiver::new(recv_socket, assembler, Arc::clone(&counters), 10);

        receiver.drain_batch();
        std::thread::sleep(Duration::from_millis(10));
        let expired = receiver.assembler.expire(Instant::now());
        receiver.counters.record_incomplete_n(expired as u64);

        let snapshot = counters.take_snapshot();
        assert_eq!(snapshot.incomplete, 1);
    }
}
