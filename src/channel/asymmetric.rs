//! Typed request/response channels over a [ConnectionStream].
//!
//! A `Channel<I, O>` sends `I` and receives `O`; the two halves can be driven from different
//! tasks. Values are bincode-serialized into length-delimited frames, optionally Snappy
//! compressed (see [FrameCodec]).

use futures::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serde::formats::*;
use tokio_serde::Framed;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::FrameCodec;
use crate::tls::connection_stream::ConnectionStream;

#[derive(Debug)]
pub enum Error<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize,
    O: for<'de> Deserialize<'de> + Serialize,
{
    IO(std::io::Error),
    ReadError(<Reader<I, O> as futures::TryStream>::Error),
    WriteError(<Writer<I, O> as futures::Sink<I>>::Error),
}

pub type Reader<I, O> =
    Framed<FramedRead<ReadHalf<ConnectionStream>, FrameCodec>, O, I, Bincode<O, I>>;

pub type Writer<I, O> =
    Framed<FramedWrite<WriteHalf<ConnectionStream>, FrameCodec>, O, I, Bincode<O, I>>;

pub struct Receiver<I, O> {
    reader: Reader<I, O>,
}

impl<I, O> Receiver<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize,
    O: for<'de> Deserialize<'de> + Serialize,
    Reader<I, O>: TryStream<Ok = O> + Unpin,
{
    /// Receive the next value; `None` once the peer has closed the stream.
    pub async fn recv(&mut self) -> Result<Option<O>, Error<I, O>> {
        Ok(self.reader.try_next().await.map_err(Error::ReadError)?)
    }
}

pub struct Sender<I, O> {
    writer: Writer<I, O>,
}

impl<I, O> Sender<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize,
    O: for<'de> Deserialize<'de> + Serialize,
    Writer<I, O>: Sink<I> + Unpin,
{
    pub async fn send(&mut self, item: I) -> Result<(), Error<I, O>> {
        Ok(self.writer.send(item).await.map_err(Error::WriteError)?)
    }
}

pub struct Channel<I, O> {
    socket: ConnectionStream,
    compression: bool,
    ghost: std::marker::PhantomData<(I, O)>,
}

impl<I, O> Channel<I, O>
where
    I: for<'de> Deserialize<'de> + Serialize,
    O: for<'de> Deserialize<'de> + Serialize,
{
    pub fn wrap(socket: ConnectionStream, compression: bool) -> Channel<I, O> {
        Channel { socket, compression, ghost: Default::default() }
    }

    pub fn split(self) -> (Sender<I, O>, Receiver<I, O>) {
        let (reader, writer) = tokio::io::split(self.socket);

        let reader = FramedRead::new(reader, FrameCodec::new(self.compression));
        let reader = Framed::new(reader, Bincode::default());

        let writer = FramedWrite::new(writer, FrameCodec::new(self.compression));
        let writer = Framed::new(writer, Bincode::default());

        (Sender { writer }, Receiver { reader })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    pub struct Request(String);
    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    pub struct Response(String);

    async fn tcp_pair() -> (ConnectionStream, ConnectionStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        let connected = connect.await.unwrap();
        (ConnectionStream::Tcp(accepted), ConnectionStream::Tcp(connected))
    }

    async fn exercise(compression: bool) {
        let (server_stream, client_stream) = tcp_pair().await;

        let server = tokio::spawn(async move {
            let channel: Channel<Request, Response> = Channel::wrap(server_stream, compression);
            let (mut sender, mut receiver) = channel.split();

            sender.send(Request(String::from("123"))).await.unwrap();
            let msg = receiver.recv().await.unwrap();
            assert_eq!(msg, Some(Response(String::from("321"))));

            sender.send(Request(String::from("456"))).await.unwrap();
            let msg = receiver.recv().await.unwrap();
            assert_eq!(msg, Some(Response(String::from("654"))));
        });

        let client = tokio::spawn(async move {
            let channel: Channel<Response, Request> = Channel::wrap(client_stream, compression);
            let (mut sender, mut receiver) = channel.split();

            let msg = receiver.recv().await.unwrap();
            assert_eq!(msg, Some(Request(String::from("123"))));
            sender.send(Response(String::from("321"))).await.unwrap();

            let msg = receiver.recv().await.unwrap();
            assert_eq!(msg, Some(Request(String::from("456"))));
            sender.send(Response(String::from("654"))).await.unwrap();
        });

        client.await.unwrap();
        server.await.unwrap();
    }

    #[actix_rt::test]
    async fn asymmetric_send_recv() {
        exercise(false).await;
    }

    #[actix_rt::test]
    async fn asymmetric_send_recv_compressed() {
        exercise(true).await;
    }

    #[actix_rt::test]
    async fn recv_reports_closed_stream() {
        let (server_stream, client_stream) = tcp_pair().await;
        drop(server_stream);

        let channel: Channel<Response, Request> = Channel::wrap(client_stream, false);
        let (_sender, mut receiver) = channel.split();
        assert!(matches!(receiver.recv().await, Ok(None)));
    }
}
