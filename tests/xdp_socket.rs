#[cfg(unix)]
mod recv_tests {
    use fluxtap::xdp_socket::XdpSocket;
    use std::net::UdpSocket;
    use std::time::{Duration, Instant};

    fn wait_recv(sock: &XdpSocket, buf: &mut [u8]) -> usize {
        let start = Instant::now();
        loop {
            match sock.recv(buf) {
                Ok(n) => return n,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > Duration::from_secs(1) {
                        panic!("timeout waiting for recv");
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => panic!("recv failed: {e}"),
            }
        }
    }

    #[test]
    fn capture_socket_receives_datagrams() {
        let bind_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
        let xdp = XdpSocket::new(bind_addr).unwrap();

        // `XdpSocket::new` doesn't expose the ephemeral port it bound, so
        // bind a second loopback socket, learn its address, and reuse that
        // as the capture socket's bind target instead of the throwaway one.
        let probe = UdpSocket::bind(bind_addr).unwrap();
        let capture_addr = probe.local_addr().unwrap();
        drop(probe);
        drop(xdp);

        let xdp = XdpSocket::new(capture_addr).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"hello", capture_addr).unwrap();

        let mut buf = [0u8; 16];
        let n = wait_recv(&xdp, &mut buf);
        assert_eq!(&buf[..n], b"hello");
    }
}

#[cfg(not(unix))]
#[test]
fn xdp_socket_not_supported() {
    eprintln!("skipping XDP socket tests on non-unix");
}
