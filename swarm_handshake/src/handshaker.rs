//! Connection establishment and handshake exchange (§4.4 "Handshake").

use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use swarm_util::bt::{InfoHash, PeerId, INFO_HASH_LEN, PEER_ID_LEN};

use crate::config::HandshakerConfig;
use crate::error::{HandshakeErrorKind, HandshakeResult};
use crate::extensions::{Extensions, NUM_EXTENSION_BYTES};
use crate::message::{CompleteMessage, InitiateMessage};
use crate::protocol::Protocol;

fn encode_handshake(prot: &Protocol, ext: &Extensions, hash: &InfoHash, pid: &PeerId) -> Vec<u8> {
    let ext_bytes: [u8; NUM_EXTENSION_BYTES] = (*ext).into();

    let mut bytes = Vec::with_capacity(1 + prot.write_len() + NUM_EXTENSION_BYTES + INFO_HASH_LEN + PEER_ID_LEN);
    prot.write_bytes(&mut bytes);
    bytes.extend_from_slice(&ext_bytes);
    bytes.extend_from_slice(hash.as_ref());
    bytes.extend_from_slice(pid.as_ref());
    bytes
}

async fn read_handshake(stream: &mut TcpStream) -> HandshakeResult<(Protocol, Extensions, InfoHash, PeerId)> {
    let mut len_buf = [0u8; 1];
    stream.read_exact(&mut len_buf).await?;

    let mut name_buf = vec![0u8; len_buf[0] as usize];
    stream.read_exact(&mut name_buf).await?;

    let mut prot_buf = Vec::with_capacity(1 + name_buf.len());
    prot_buf.push(len_buf[0]);
    prot_buf.extend_from_slice(&name_buf);
    let (prot, _) = Protocol::from_bytes(&prot_buf).expect("just read exactly this many bytes");

    let mut ext_buf = [0u8; NUM_EXTENSION_BYTES];
    stream.read_exact(&mut ext_buf).await?;
    let ext = Extensions::from(ext_buf);

    let mut hash_buf = [0u8; INFO_HASH_LEN];
    stream.read_exact(&mut hash_buf).await?;
    let hash = InfoHash::from(hash_buf);

    let mut pid_buf = [0u8; PEER_ID_LEN];
    stream.read_exact(&mut pid_buf).await?;
    let pid = PeerId::from(pid_buf);

    Ok((prot, ext, hash, pid))
}

/// Connect to `initiate.address()` and perform the outbound handshake.
pub async fn initiate_handshake(
    initiate: InitiateMessage,
    our_peer_id: PeerId,
    our_extensions: Extensions,
    config: &HandshakerConfig,
) -> HandshakeResult<CompleteMessage<TcpStream>> {
    let (prot, hash, addr) = initiate.into_parts();

    let mut stream = connect_with_timeout(addr, config.connect_timeout()).await?;

    let out_bytes = encode_handshake(&prot, &our_extensions, &hash, &our_peer_id);
    with_timeout(stream.write_all(&out_bytes), config.handshake_timeout()).await??;

    let (peer_prot, peer_ext, peer_hash, peer_pid) =
        with_timeout(read_handshake(&mut stream), config.handshake_timeout()).await??;

    if peer_prot != prot {
        return Err(HandshakeErrorKind::ProtocolMismatch {
            expected: format!("{:?}", prot).into_bytes(),
            actual: format!("{:?}", peer_prot).into_bytes(),
        }
        .into());
    }
    if peer_hash != hash {
        return Err(HandshakeErrorKind::InfoHashMismatch { hash: peer_hash }.into());
    }

    debug!("completed outbound handshake with {}", addr);
    Ok(CompleteMessage::new(prot, peer_ext, peer_hash, peer_pid, addr, stream))
}

/// Complete an inbound handshake on an already-accepted `stream`.
/// `accept_hash` decides whether the announced info hash belongs to a
/// swarm we are tracking; if it returns `false` the connection is dropped.
/// `is_duplicate_peer` decides, once the peer id is known, whether that
/// peer id already has a live connection to the same swarm (§4.4's
/// receive FSM: `read_peer_id -> read_msg_len` requires this duplicate
/// check before the connection is admitted).
pub async fn complete_inbound_handshake<F, G>(
    mut stream: TcpStream,
    addr: SocketAddr,
    our_peer_id: PeerId,
    our_extensions: Extensions,
    accept_hash: F,
    is_duplicate_peer: G,
    config: &HandshakerConfig,
) -> HandshakeResult<CompleteMessage<TcpStream>>
where
    F: FnOnce(&InfoHash) -> bool,
    G: FnOnce(&InfoHash, &PeerId) -> bool,
{
    let (peer_prot, peer_ext, peer_hash, peer_pid) =
        with_timeout(read_handshake(&mut stream), config.handshake_timeout()).await??;

    if !accept_hash(&peer_hash) {
        return Err(HandshakeErrorKind::InfoHashMismatch { hash: peer_hash }.into());
    }
    if is_duplicate_peer(&peer_hash, &peer_pid) {
        return Err(HandshakeErrorKind::DuplicatePeerId { peer_id: peer_pid }.into());
    }

    let out_bytes = encode_handshake(&peer_prot, &our_extensions, &peer_hash, &our_peer_id);
    with_timeout(stream.write_all(&out_bytes), config.handshake_timeout()).await??;

    debug!("completed inbound handshake with {}", addr);
    Ok(CompleteMessage::new(peer_prot, peer_ext, peer_hash, peer_pid, addr, stream))
}

async fn connect_with_timeout(addr: SocketAddr, timeout: Duration) -> HandshakeResult<TcpStream> {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(HandshakeErrorKind::ConnectTimedOut { millis: timeout.as_millis() as u64 }.into()),
    }
}

async fn with_timeout<F, T>(future: F, timeout: Duration) -> HandshakeResult<T>
where
    F: std::future::Future<Output = T>,
{
    time::timeout(timeout, future)
        .await
        .map_err(|_| HandshakeErrorKind::HandshakeTimedOut { millis: timeout.as_millis() as u64 }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn positive_handshake_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let hash = InfoHash::from([7u8; INFO_HASH_LEN]);
        let client_pid = PeerId::from([1u8; PEER_ID_LEN]);
        let server_pid = PeerId::from([2u8; PEER_ID_LEN]);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            complete_inbound_handshake(
                stream,
                addr,
                server_pid,
                Extensions::new(),
                |got_hash| *got_hash == hash,
                |_, _| false,
                &HandshakerConfig::default(),
            )
            .await
            .unwrap()
        });

        let initiate = InitiateMessage::new(Protocol::BitTorrent, hash, addr);
        let client_complete =
            initiate_handshake(initiate, client_pid, Extensions::new(), &HandshakerConfig::default())
                .await
                .unwrap();

        let server_complete = server.await.unwrap();

        assert_eq!(*client_complete.peer_id(), server_pid);
        assert_eq!(*server_complete.peer_id(), client_pid);
        assert_eq!(*client_complete.hash(), hash);
    }

    #[tokio::test]
    async fn negative_mismatched_hash_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let wanted_hash = InfoHash::from([9u8; INFO_HASH_LEN]);
        let other_hash = InfoHash::from([1u8; INFO_HASH_LEN]);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            complete_inbound_handshake(
                stream,
                addr,
                PeerId::from([2u8; PEER_ID_LEN]),
                Extensions::new(),
                |got_hash| *got_hash == wanted_hash,
                |_, _| false,
                &HandshakerConfig::default(),
            )
            .await
        });

        let initiate = InitiateMessage::new(Protocol::BitTorrent, other_hash, addr);
        let _ = initiate_handshake(
            initiate,
            PeerId::from([1u8; PEER_ID_LEN]),
            Extensions::new(),
            &HandshakerConfig::default(),
        )
        .await;

        assert!(server.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn negative_duplicate_peer_id_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let hash = InfoHash::from([7u8; INFO_HASH_LEN]);
        let client_pid = PeerId::from([1u8; PEER_ID_LEN]);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            complete_inbound_handshake(
                stream,
                addr,
                PeerId::from([2u8; PEER_ID_LEN]),
                Extensions::new(),
                |got_hash| *got_hash == hash,
                |_, peer_id| *peer_id == client_pid,
                &HandshakerConfig::default(),
            )
            .await
        });

        let initiate = InitiateMessage::new(Protocol::BitTorrent, hash, addr);
        let _ = initiate_handshake(initiate, client_pid, Extensions::new(), &HandshakerConfig::default()).await;

        assert!(server.await.unwrap().is_err());
    }
}
