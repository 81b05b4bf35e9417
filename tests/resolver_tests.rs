//! Name-resolver gossip tests over loopback sockets

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use baton::{
        context::ResolverConfig,
        resolver::{DriverNameResolver, ResolutionType},
        DriverError,
    };

    fn now_ms() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64
    }

    fn new_resolver(name: &str, bootstrap: Option<String>) -> DriverNameResolver {
        DriverNameResolver::new(&ResolverConfig {
            name: Some(name.to_string()),
            bind_address: "127.0.0.1:0".to_string(),
            bootstrap_neighbor: bootstrap,
            ..Default::default()
        })
        .unwrap()
    }

    /// Two drivers, one seeded with the other's address, discover each
    /// other's names and nothing else.
    #[test]
    fn test_two_driver_round_trip() {
        let mut b = new_resolver("b", None);
        let mut a = new_resolver("a", Some(b.local_address().to_string()));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let now = now_ms();
            a.do_work(now).unwrap();
            b.do_work(now).unwrap();

            let converged = a.cache().lookup("b", ResolutionType::Ip4).is_some()
                && b.cache().lookup("a", ResolutionType::Ip4).is_some();
            if converged {
                break;
            }
            assert!(Instant::now() < deadline, "gossip never converged");
            std::thread::sleep(Duration::from_millis(5));
        }

        let b_entry = a.cache().lookup("b", ResolutionType::Ip4).unwrap();
        assert_eq!(b_entry.port, b.local_address().port());
        let a_entry = b.cache().lookup("a", ResolutionType::Ip4).unwrap();
        assert_eq!(a_entry.port, a.local_address().port());

        // No driver caches itself, and each has exactly one neighbor.
        assert!(a.cache().lookup("a", ResolutionType::Ip4).is_none());
        assert!(b.cache().lookup("b", ResolutionType::Ip4).is_none());
        assert_eq!(a.neighbors().len(), 1);
        assert_eq!(b.neighbors().len(), 1);

        assert_eq!(a.invalid_frames(), 0);
        assert_eq!(b.invalid_frames(), 0);
    }

    /// A third driver bootstrapped off one peer learns about the other
    /// through neighbor gossip.
    #[test]
    fn test_names_propagate_through_gossip() {
        let mut a = new_resolver("a", None);
        let mut b = new_resolver("b", Some(a.local_address().to_string()));
        let mut c = new_resolver("c", Some(a.local_address().to_string()));

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let now = now_ms();
            a.do_work(now).unwrap();
            b.do_work(now).unwrap();
            c.do_work(now).unwrap();

            if c.cache().lookup("b", ResolutionType::Ip4).is_some()
                && b.cache().lookup("c", ResolutionType::Ip4).is_some()
            {
                break;
            }
            assert!(Instant::now() < deadline, "gossip never propagated b<->c");
            std::thread::sleep(Duration::from_millis(5));
        }

        // The propagated entries carry the advertised socket addresses.
        assert_eq!(
            c.cache().lookup("b", ResolutionType::Ip4).unwrap().port,
            b.local_address().port()
        );
        assert_eq!(
            b.cache().lookup("c", ResolutionType::Ip4).unwrap().port,
            c.local_address().port()
        );
    }

    /// A resolvable name serves endpoint construction; an unknown one falls
    /// through to the bootstrap resolver and then fails.
    #[test]
    fn test_resolve_uses_gossiped_names() {
        let mut b = new_resolver("b", None);
        let mut a = new_resolver("a", Some(b.local_address().to_string()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while a.cache().lookup("b", ResolutionType::Ip4).is_none() {
            let now = now_ms();
            a.do_work(now).unwrap();
            b.do_work(now).unwrap();
            assert!(Instant::now() < deadline, "gossip never converged");
            std::thread::sleep(Duration::from_millis(5));
        }

        let resolved = a.resolve_endpoint("b:7000").unwrap();
        assert_eq!(resolved.ip(), b.local_address().ip());
        assert_eq!(resolved.port(), 7000);

        assert!(matches!(
            a.resolve_endpoint("nobody-we-know.invalid:7000"),
            Err(DriverError::NameUnresolvable { .. })
        ));
    }

    /// Garbage datagrams are counted and dropped without wedging the cycle.
    #[test]
    fn test_invalid_frames_are_counted() {
        let mut a = new_resolver("a", None);

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"definitely not a resolution frame", a.local_address())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while a.invalid_frames() == 0 {
            a.do_work(now_ms()).unwrap();
            assert!(Instant::now() < deadline, "frame never observed");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(a.invalid_frames(), 1);
        assert!(a.cache().is_empty());
        assert!(a.neighbors().is_empty());

        // The resolver keeps working afterwards.
        a.do_work(now_ms() + 20).unwrap();
    }
}
