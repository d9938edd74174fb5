use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Which leg ended a splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceEnd {
    /// The client stopped sending; `bytes` went client → upstream.
    Client { bytes: u64 },
    /// The upstream stopped sending; `bytes` went upstream → client.
    Upstream { bytes: u64 },
}

/// Relay bytes between `client` and `upstream` in both directions.
///
/// The first direction to finish, by EOF or error, ends the whole session:
/// the other direction is cancelled and both connections are dropped, so
/// losing either leg closes the other promptly.
pub async fn splice<C, U>(client: C, upstream: U) -> std::io::Result<SpliceEnd>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let client_to_upstream = async {
        let bytes = tokio::io::copy(&mut client_read, &mut upstream_write).await?;
        let _ = upstream_write.shutdown().await;
        Ok::<_, std::io::Error>(SpliceEnd::Client { bytes })
    };

    let upstream_to_client = async {
        let bytes = tokio::io::copy(&mut upstream_read, &mut client_write).await?;
        let _ = client_write.shutdown().await;
        Ok::<_, std::io::Error>(SpliceEnd::Upstream { bytes })
    };

    tokio::select! {
        end = client_to_upstream => end,
        end = upstream_to_client => end,
    }
}
