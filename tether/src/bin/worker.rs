//! Tether worker daemon.
//!
//! Hosts a small demo object so a client can be pointed at a live worker
//! without writing any code. The launch environment passes the transport
//! address; everything else is defaulted.
//!
//! # Usage
//!
//! ```sh
//! tether-worker ipc:///tmp/tether.sock
//! tether-worker tcp://127.0.0.1:5555 --max-frame 1048576
//! ```
//!
//! The process serves until terminated externally (Ctrl+C).

use std::io;

use tether::object::{HostObject, ObjectError, ObjectIter, ObjectValue, arg};
use tether::transport::TransportError;
use tether::wire::Value;
use tether::worker::{Worker, WorkerConfig, WorkerError};

fn main() {
    if let Err(e) = run() {
        eprintln!("tether-worker: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), WorkerError> {
    tether::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let (address, config) = parse_args(&args)?;

    let worker = Worker::bind(&address, config)?;
    eprintln!("tether-worker: serving on {}", worker.local_endpoint());

    worker.run(Playground::new())
}

/// Parses command line arguments into an address and a config.
fn parse_args(args: &[String]) -> Result<(String, WorkerConfig), WorkerError> {
    let mut address: Option<String> = None;
    let mut config = WorkerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--max-frame" | "-m" => {
                i += 1;
                let raw = args.get(i).ok_or_else(|| invalid("missing value for --max-frame"))?;
                config.max_frame_len = raw
                    .parse()
                    .map_err(|_| invalid("--max-frame expects a byte count"))?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                return Err(invalid(&format!("unknown argument: {other}")));
            }
            other => {
                if address.replace(other.to_owned()).is_some() {
                    return Err(invalid("more than one address given"));
                }
            }
        }
        i += 1;
    }

    let address = address.ok_or_else(|| invalid("missing address"))?;
    Ok((address, config))
}

fn invalid(msg: &str) -> WorkerError {
    WorkerError::Transport(TransportError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        msg.to_owned(),
    )))
}

fn print_usage() {
    eprintln!(
        r#"tether-worker - demo worker hosting a sample object

USAGE:
    tether-worker <ADDRESS> [OPTIONS]

ADDRESS:
    ipc://<path>        Unix domain socket
    tcp://<ip:port>     TCP socket (port 0 picks a free port)

OPTIONS:
    -m, --max-frame <BYTES>   Maximum message size (default: 16 MiB)
    -h, --help                Print this help message

EXAMPLE:
    tether-worker ipc:///tmp/tether.sock
"#
    );
}

/// The hosted demo object.
///
/// Attributes: `value` (int), `items` (list). Methods: `add(a, b)`,
/// `get_counter()` (returns a live Counter by proxy), `fail()` (raises).
/// Iterable over `items`.
struct Playground {
    value: i64,
    items: Vec<i64>,
}

impl Playground {
    fn new() -> Self {
        Self {
            value: 42,
            items: vec![1, 2, 3],
        }
    }
}

impl HostObject for Playground {
    fn type_name(&self) -> &str {
        "Playground"
    }

    fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
        match name {
            "value" => Ok(ObjectValue::value(self.value)),
            "items" => Ok(ObjectValue::Value(Value::List(
                self.items.iter().map(|&i| Value::Int(i)).collect(),
            ))),
            _ => Err(ObjectError::AttributeNotFound {
                type_name: self.type_name().to_owned(),
                name: name.to_owned(),
            }),
        }
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        _kwargs: &[(String, Value)],
    ) -> Result<ObjectValue, ObjectError> {
        match name {
            "add" => {
                let a: i64 = arg(args, 0, "add")?;
                let b: i64 = arg(args, 1, "add")?;
                Ok(ObjectValue::value(a + b))
            }
            "get_counter" => Ok(ObjectValue::object(Counter { total: 0 })),
            "fail" => Err(ObjectError::raised("ValueError", "Intentional error")),
            _ => Err(ObjectError::MethodNotFound {
                type_name: self.type_name().to_owned(),
                name: name.to_owned(),
            }),
        }
    }

    fn iterate(&self) -> Result<ObjectIter, ObjectError> {
        let items = self.items.clone();
        Ok(Box::new(items.into_iter().map(ObjectValue::value)))
    }
}

/// A stateful object handed out by proxy (its snapshot is refused by
/// default, so clients always reach the same live instance).
struct Counter {
    total: i64,
}

impl HostObject for Counter {
    fn type_name(&self) -> &str {
        "Counter"
    }

    fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
        match name {
            "total" => Ok(ObjectValue::value(self.total)),
            _ => Err(ObjectError::AttributeNotFound {
                type_name: self.type_name().to_owned(),
                name: name.to_owned(),
            }),
        }
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        _kwargs: &[(String, Value)],
    ) -> Result<ObjectValue, ObjectError> {
        match name {
            "increment" => {
                let by: i64 = arg(args, 0, "increment")?;
                self.total += by;
                Ok(ObjectValue::value(self.total))
            }
            _ => Err(ObjectError::MethodNotFound {
                type_name: self.type_name().to_owned(),
                name: name.to_owned(),
            }),
        }
    }
}
