//! The resource broker daemon (spec §4, §5): reads the master, node, and
//! resource-group configuration files, builds the inventory and scheduler,
//! and serves client connections on a local domain socket and (optionally)
//! an authenticated TCP socket, one thread per connection.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::net::{UnixListener, UnixStream};
use std::thread;

use argh::FromArgs;
use log::{error, info, warn};

use vizstack_core::{build_inventory, Broker, Dispatcher, MasterConfig};
use vizstack_proto::{AuthScheme, Command, PeerIdentity, Response};
use vizstack_types::{VizError, VizErrorKind, VizResult};

#[derive(FromArgs)]
/// VizStack resource broker: coordinates access to GPUs, SLI bridges,
/// X-server slots, keyboards, and mice across a cluster of render nodes.
struct BrokerArgs {
    /// path to the master configuration XML file (auth scheme, listen
    /// addresses)
    #[argh(option, default = "\"/etc/vizstack/masterconfig.xml\".to_string()")]
    master_config_file: String,

    /// path to the per-node resource inventory XML file
    #[argh(option, default = "\"/etc/vizstack/nodeconfig.xml\".to_string()")]
    node_config_file: String,

    /// path to the named resource-group catalog XML file
    #[argh(option, default = "\"/etc/vizstack/resourcegroups.xml\".to_string()")]
    rg_config_file: String,

    /// path to the display-device catalog XML file
    #[argh(option, default = "\"/etc/vizstack/displaydevices.xml\".to_string()")]
    display_device_config_file: String,
}

fn main() {
    env_logger::init();
    let args: BrokerArgs = argh::from_env();

    if let Err(e) = run(args) {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

fn run(args: BrokerArgs) -> VizResult<()> {
    let master_config = MasterConfig::parse(&read_config(&args.master_config_file)?)?;
    let node_config = read_config(&args.node_config_file)?;
    let rg_config = read_config(&args.rg_config_file)?;
    let display_device_config = read_config(&args.display_device_config_file)?;
    let (inventory, scheduler) = build_inventory(&node_config, &rg_config, &display_device_config)?;

    info!(
        "loaded {} node(s), auth scheme {:?}, local socket {}",
        inventory.nodes.len(),
        master_config.auth_scheme,
        master_config.socket_path
    );

    // Leaked deliberately: the broker and its dispatcher live for the
    // whole process, so a single `'static` allocation at startup is
    // simpler than threading scoped-thread lifetimes through every
    // connection handler.
    let broker: &'static Broker = Box::leak(Box::new(Broker::new(inventory, scheduler)));
    let rg_config_file: &'static str = Box::leak(args.rg_config_file.into_boxed_str());
    let dispatcher: &'static Dispatcher<'static> = Box::leak(Box::new(Dispatcher::new(broker, move || {
        let bytes = read_config(rg_config_file)?;
        vizstack_core::load_resource_group_config(&bytes)
    })));

    let socket_path = master_config.socket_path.clone();
    let _ = std::fs::remove_file(&socket_path);
    let unix_listener = UnixListener::bind(&socket_path)
        .map_err(|e| VizError::new(VizErrorKind::SocketError, format!("failed to bind '{socket_path}': {e}")))?;
    info!("listening on local socket {socket_path}");

    let tcp_listener = match &master_config.tcp_bind {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .map_err(|e| VizError::new(VizErrorKind::SocketError, format!("failed to bind '{addr}': {e}")))?;
            info!("listening on tcp {addr} (auth scheme {:?})", master_config.auth_scheme);
            Some(listener)
        }
        None => None,
    };
    let auth_scheme = master_config.auth_scheme;

    thread::scope(|scope| {
        scope.spawn(|| accept_unix(unix_listener, dispatcher, scope));
        if let Some(tcp_listener) = tcp_listener {
            scope.spawn(|| accept_tcp(tcp_listener, dispatcher, auth_scheme, scope));
        }
    });

    Ok(())
}

fn read_config(path: &str) -> VizResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| VizError::new(VizErrorKind::BadConfiguration, format!("failed to read '{path}': {e}")))
}

fn accept_unix<'scope>(listener: UnixListener, dispatcher: &'scope Dispatcher<'scope>, scope: &'scope thread::Scope<'scope, '_>) {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                scope.spawn(move || {
                    let mut stream = stream;
                    let peer = unix_peer_identity(&stream);
                    serve_connection(&mut stream, dispatcher, peer, false);
                });
            }
            Err(e) => warn!("failed to accept local connection: {e}"),
        }
    }
}

fn accept_tcp<'scope>(
    listener: TcpListener,
    dispatcher: &'scope Dispatcher<'scope>,
    auth_scheme: AuthScheme,
    scope: &'scope thread::Scope<'scope, '_>,
) {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                scope.spawn(move || {
                    let mut stream = stream;
                    let munge = matches!(auth_scheme, AuthScheme::Munge);
                    serve_connection(&mut stream, dispatcher, None, munge);
                });
            }
            Err(e) => warn!("failed to accept tcp connection: {e}"),
        }
    }
}

fn unix_peer_identity(stream: &UnixStream) -> Option<PeerIdentity> {
    stream.peer_cred().ok().map(|cred| PeerIdentity { uid: cred.uid, gid: Some(cred.gid) })
}

/// Services one connection end to end: opens a session, then loops reading
/// a framed message, unwrapping it (Munge, if `munge`), dispatching it, and
/// writing the (re-wrapped, if `munge`) response back, until the peer
/// disconnects.
fn serve_connection<S: Read + Write>(stream: &mut S, dispatcher: &Dispatcher, peer: Option<PeerIdentity>, munge: bool) {
    let session_id = dispatcher.open_session(peer);
    loop {
        let raw = match vizstack_proto::read_message(stream) {
            Ok(raw) => raw,
            Err(e) if e.kind == VizErrorKind::NotConnected => break,
            Err(e) => {
                warn!("session {session_id}: framing error: {e}");
                break;
            }
        };

        let payload = if munge {
            match vizstack_proto::decode_munge_frame(&raw) {
                Ok((_peer, payload)) => payload,
                Err(e) => {
                    send_response(stream, &Response::err(e), munge);
                    break;
                }
            }
        } else {
            raw
        };

        let command = match Command::decode(&payload) {
            Ok(command) => command,
            Err(e) => {
                send_response(stream, &Response::err(e), munge);
                continue;
            }
        };

        let response = dispatcher.dispatch(session_id, munge, command);
        send_response(stream, &response, munge);
    }
    dispatcher.close_session(session_id);
}

fn send_response<S: Write>(stream: &mut S, response: &Response, munge: bool) {
    let bytes = response.to_bytes();
    let framed = if munge {
        match vizstack_proto::encode_munge_frame(&bytes) {
            Ok(framed) => framed,
            Err(e) => {
                warn!("failed to munge-wrap response: {e}");
                return;
            }
        }
    } else {
        bytes
    };
    if let Err(e) = vizstack_proto::write_message(stream, &framed) {
        warn!("failed to write response: {e}");
    }
}
