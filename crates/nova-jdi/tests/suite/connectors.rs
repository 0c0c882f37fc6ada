use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nova_jdi::connect::attach::SocketAttachingConnector;
use nova_jdi::connect::launch::{JavaCommandLineLauncher, RawCommandLineLauncher};
use nova_jdi::connect::listen::{GenericListeningConnector, SocketListeningConnector};
use nova_jdi::connect::resources::{BuiltinResources, OverrideResources};
use nova_jdi::connect::socket::SocketTransport;
use nova_jdi::connect::transport::TransportService;
use nova_jdi::connect::{
    AttachingConnector, Connector, ConnectorContext, LaunchingConnector, ListeningConnector,
};
use nova_jdi::mock::{MockLauncher, MockTarget, MockTransport, TransportEvent};
use nova_jdi::{JdiError, SessionBuilder};

const HANDSHAKE: &[u8] = b"JDWP-Handshake";

fn context() -> ConnectorContext {
    ConnectorContext::new(SessionBuilder::new(Arc::new(MockTarget::new())))
}

fn argument_name(err: JdiError) -> String {
    match err {
        JdiError::ConnectorArgument { name, .. } => name,
        other => panic!("expected ConnectorArgument, got {other:?}"),
    }
}

/// Plays the target side of the handshake: the debugger speaks first and the
/// target echoes.
fn answer_handshake(mut stream: TcpStream, reply: &'static [u8]) {
    let mut greeting = [0u8; 14];
    stream.read_exact(&mut greeting).unwrap();
    assert_eq!(&greeting, HANDSHAKE);
    stream.write_all(reply).unwrap();
    stream.flush().unwrap();
}

#[test]
fn raw_launch_substitutes_the_address_and_releases_the_listener() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let launcher = Arc::new(MockLauncher::new());
    let connector =
        RawCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());
    assert_eq!(connector.name(), "RawCommandLineLaunch");
    assert_eq!(connector.transport_name(), "Mock");

    let args = connector
        .default_arguments()
        .with("command", r#"target --connect {address} "two words""#)
        .with("address", "localhost:5005");
    let session = connector.launch(&args).unwrap();

    assert_eq!(
        launcher.launched(),
        [["target", "--connect", "localhost:5005", "two words"]]
    );
    assert_eq!(session.process_id(), Some(1_000));
    assert_eq!(
        transport.events(),
        [
            TransportEvent::StartListening("localhost:5005".into()),
            TransportEvent::Accept("localhost:5005".into()),
            TransportEvent::StopListening("localhost:5005".into()),
        ]
    );
    assert!(transport.listening().is_empty());

    session.dispose().unwrap();
    assert!(launcher.was_killed(0));
}

#[test]
fn raw_launch_rejects_a_long_quote_before_doing_anything() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let launcher = Arc::new(MockLauncher::new());
    let connector =
        RawCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());

    let args = connector
        .default_arguments()
        .with("command", "target")
        .with("address", "localhost:5005")
        .with("quote", "''");
    assert_eq!(argument_name(connector.launch(&args).unwrap_err()), "quote");
    assert!(transport.events().is_empty());
    assert!(launcher.launched().is_empty());
}

#[test]
fn raw_launch_accepts_a_whitespace_quote_character() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let launcher = Arc::new(MockLauncher::new());
    let connector =
        RawCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());

    let args = connector
        .default_arguments()
        .with("command", "target \tone \"two\"\t {address}")
        .with("address", "localhost:5005")
        .with("quote", "\t");
    connector.launch(&args).unwrap();

    assert_eq!(
        launcher.launched(),
        [["target", "one \"two\"", "localhost:5005"]]
    );
}

#[test]
fn raw_launch_requires_command_and_address() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let connector =
        RawCommandLineLauncher::with_parts(transport.clone(), Arc::new(MockLauncher::new()), context());

    let no_address = connector.default_arguments().with("command", "target");
    assert_eq!(argument_name(connector.launch(&no_address).unwrap_err()), "address");

    let blank_command = connector
        .default_arguments()
        .with("command", "   ")
        .with("address", "localhost:1");
    assert_eq!(argument_name(connector.launch(&blank_command).unwrap_err()), "command");

    let unknown = connector
        .default_arguments()
        .with("command", "target")
        .with("address", "localhost:1")
        .with("comand", "typo");
    assert_eq!(argument_name(connector.launch(&unknown).unwrap_err()), "comand");
    assert!(transport.events().is_empty());
}

#[test]
fn target_that_never_connects_is_killed() {
    let transport = Arc::new(MockTransport::new("Mock"));
    transport.fail_accept(true);
    let launcher = Arc::new(MockLauncher::new());
    let connector =
        RawCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());

    let args = connector
        .default_arguments()
        .with("command", "target")
        .with("address", "localhost:5005");
    assert!(matches!(
        connector.launch(&args),
        Err(JdiError::Transport { .. })
    ));
    assert!(launcher.was_killed(0));
    assert!(transport.listening().is_empty());
    assert!(matches!(
        transport.events().last(),
        Some(TransportEvent::StopListening(_))
    ));
}

#[test]
fn failed_process_start_releases_the_listener() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let launcher = Arc::new(MockLauncher::new());
    launcher.fail(true);
    let connector =
        RawCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());

    let args = connector
        .default_arguments()
        .with("command", "missing-binary")
        .with("address", "localhost:5005");
    assert!(matches!(
        connector.launch(&args),
        Err(JdiError::Launch { .. })
    ));
    assert!(transport.listening().is_empty());
    assert!(!transport
        .events()
        .iter()
        .any(|event| matches!(event, TransportEvent::Accept(_))));
}

#[test]
fn java_launch_points_the_agent_at_the_listener() {
    let transport = Arc::new(MockTransport::new("Socket"));
    let launcher = Arc::new(MockLauncher::new());
    let connector =
        JavaCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());
    assert_eq!(connector.name(), "CommandLineLaunch");

    let args = connector
        .default_arguments()
        .with("home", "")
        .with("main", "com.example.Main arg")
        .with("options", r#"-Xmx64m -Dgreeting="hello world""#)
        .with("suspend", "false");
    connector.launch(&args).unwrap();

    assert_eq!(
        launcher.launched(),
        [[
            "java",
            "-Xmx64m",
            "-Dgreeting=hello world",
            "-agentlib:jdwp=transport=dt_socket,address=localhost:40000,suspend=n",
            "com.example.Main",
            "arg",
        ]]
    );
    assert!(transport.listening().is_empty());
}

#[test]
fn java_launch_validates_before_listening() {
    let transport = Arc::new(MockTransport::new("Socket"));
    let launcher = Arc::new(MockLauncher::new());
    let connector =
        JavaCommandLineLauncher::with_parts(transport.clone(), launcher.clone(), context());

    let no_main = connector.default_arguments().with("home", "");
    assert_eq!(argument_name(connector.launch(&no_main).unwrap_err()), "main");

    let bad_suspend = connector
        .default_arguments()
        .with("main", "Main")
        .with("suspend", "maybe");
    assert_eq!(argument_name(connector.launch(&bad_suspend).unwrap_err()), "suspend");

    let unbalanced = connector
        .default_arguments()
        .with("main", "Main")
        .with("options", r#"-Dx="open"#);
    assert_eq!(argument_name(connector.launch(&unbalanced).unwrap_err()), "command");

    assert!(transport.events().is_empty());
    assert!(launcher.launched().is_empty());
}

#[test]
fn wildcard_listens_get_distinct_ports() {
    let transport = Arc::new(MockTransport::new("Socket"));
    let connector = SocketListeningConnector::with_transport(transport.clone(), context());
    assert!(connector.supports_multiple_connections());

    let mut first = connector.default_arguments();
    let mut second = connector.default_arguments().with("port", "0");
    let first_address = connector.start_listening(&mut first).unwrap();
    let second_address = connector.start_listening(&mut second).unwrap();

    assert_ne!(first_address, second_address);
    assert_eq!(first.get("port"), Some("40000"));
    assert_eq!(second.get("port"), Some("40001"));
    assert_eq!(connector.listening_count(), 2);

    connector.stop_listening(&first).unwrap();
    connector.stop_listening(&second).unwrap();
    assert!(transport.listening().is_empty());
    assert!(matches!(
        connector.stop_listening(&first),
        Err(JdiError::ConnectorArgument { .. })
    ));
}

#[test]
fn listening_connector_accepts_repeatedly_on_one_listener() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let connector = GenericListeningConnector::new(transport.clone(), context());

    let mut args = connector.default_arguments().with("address", "localhost:7000");
    assert_eq!(connector.start_listening(&mut args).unwrap(), "localhost:7000");
    assert!(connector.is_listening(&args));

    let a = connector.accept(&args).unwrap();
    let b = connector.accept(&args).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(transport.listening(), ["localhost:7000"]);

    connector.stop_listening(&args).unwrap();
    assert!(!connector.is_listening(&args));
}

#[test]
fn descriptions_come_from_resources() {
    let transport = Arc::new(MockTransport::new("Mock"));
    let connector = GenericListeningConnector::new(transport.clone(), context());
    assert_eq!(
        connector.description(),
        "Accepts Mock connections initiated by other VMs"
    );

    let resources = OverrideResources::new(BuiltinResources)
        .set("connector.generic_listening.description", "Wartet über {transport}");
    let localized = GenericListeningConnector::new(
        transport,
        context().with_resources(Arc::new(resources)),
    );
    assert_eq!(localized.description(), "Wartet über Mock");
}

#[test]
fn socket_attach_completes_the_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let target = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        answer_handshake(stream, HANDSHAKE);
    });

    let connector = SocketAttachingConnector::new(context());
    assert_eq!(connector.name(), "SocketAttach");
    let args = connector
        .default_arguments()
        .with("hostname", "127.0.0.1")
        .with("port", port.to_string())
        .with("timeout", "5000");
    let session = connector.attach(&args).unwrap();
    target.join().unwrap();
    session.dispose().unwrap();
}

#[test]
fn socket_attach_rejects_a_wrong_handshake_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let target = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        answer_handshake(stream, b"JDWP-Handshakx");
    });

    let connector = SocketAttachingConnector::new(context());
    let args = connector
        .default_arguments()
        .with("hostname", "127.0.0.1")
        .with("port", port.to_string());
    assert!(matches!(
        connector.attach(&args),
        Err(JdiError::Transport { .. })
    ));
    target.join().unwrap();
}

#[test]
fn socket_listen_accepts_a_connecting_target() {
    let connector = SocketListeningConnector::new(context());
    let mut args = connector.default_arguments().with("timeout", "5000");
    let address = connector.start_listening(&mut args).unwrap();
    let port: u16 = args.get("port").unwrap().parse().unwrap();
    assert_eq!(address, format!("localhost:{port}"));

    let target = thread::spawn(move || {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        answer_handshake(stream, HANDSHAKE);
    });

    let session = connector.accept(&args).unwrap();
    target.join().unwrap();
    session.dispose().unwrap();
    connector.stop_listening(&args).unwrap();
    assert_eq!(connector.listening_count(), 0);
}

#[test]
fn socket_listen_times_out_without_a_target() {
    let connector = SocketListeningConnector::new(context());
    let args = connector.default_arguments().with("timeout", "50");
    assert!(matches!(
        connector.accept(&args),
        Err(JdiError::Transport { .. })
    ));
}

#[test]
fn stop_listening_wakes_a_pending_accept_and_closes_the_port() {
    let transport = Arc::new(SocketTransport::new());
    let key = transport.start_listening(None).unwrap();
    let port: u16 = key.port().unwrap().parse().unwrap();

    let acceptor = {
        let transport = transport.clone();
        let key = key.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let result = transport.accept(&key, 0, 200);
            (result.map(|_| ()), started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(200));
    transport.stop_listening(&key).unwrap();

    let (result, waited) = acceptor.join().unwrap();
    assert!(matches!(result, Err(JdiError::Transport { .. })));
    assert!(waited < Duration::from_secs(2), "accept lingered for {waited:?}");
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}
