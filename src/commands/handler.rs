//! Command Handler Module
//!
//! This module implements the Redis-compatible commands of emberkv.
//! It receives decoded requests and dispatches them to the appropriate handlers.
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `SET key value [EX seconds | PX milliseconds] [NX | XX]` - Set a key
//! - `GET key` - Get a key's value
//! - `DEL key [key ...]` - Delete keys
//! - `EXISTS key [key ...]` - Check if keys exist
//! - `INCR key` / `DECR key` - Increment / decrement an integer
//! - `INCRBY key n` / `DECRBY key n` - Increment / decrement by amount
//!
//! ### Key Commands
//! - `EXPIRE key seconds` / `PEXPIRE key milliseconds` - Set expiry
//! - `TTL key` / `PTTL key` - Get remaining TTL
//! - `PERSIST key` - Remove expiry
//! - `KEYS pattern` - Find keys by pattern
//!
//! ### Server Commands
//! - `PING [message]`, `ECHO message`, `QUIT`
//! - `INFO`, `DBSIZE`, `FLUSHDB`, `FLUSHALL`
//! - `COMMAND`, `CONFIG GET pattern`, `TIME`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  Request    │───>│  dispatch() │───>│  cmd_xxx()  │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine (owned)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{Request, RespValue};
use crate::storage::engine::glob_match;
use crate::storage::{StorageEngine, StorageError};
use bytes::Bytes;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::trace;

const COMMANDS: &[&str] = &[
    "PING", "ECHO", "QUIT", "SET", "GET", "DEL", "EXISTS", "INCR", "INCRBY", "DECR", "DECRBY",
    "EXPIRE", "PEXPIRE", "TTL", "PTTL", "PERSIST", "KEYS", "DBSIZE", "FLUSHDB", "FLUSHALL", "INFO",
    "CONFIG", "TIME", "COMMAND",
];

/// Server-wide counters reported by INFO. The event loop keeps the
/// connection figures current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerCounters {
    pub connected_clients: u64,
    pub total_connections_received: u64,
    pub rejected_connections: u64,
    pub total_commands_processed: u64,
}

/// Executes requests against the key-space it owns.
pub struct CommandHandler {
    /// The storage engine
    storage: StorageEngine,
    /// Server start time for INFO
    start_time: Instant,
    /// Startup configuration exposed through CONFIG GET
    params: Vec<(String, String)>,
    counters: ServerCounters,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: StorageEngine) -> Self {
        Self {
            storage,
            start_time: Instant::now(),
            params: Vec::new(),
            counters: ServerCounters::default(),
        }
    }

    /// Sets the name/value pairs returned by CONFIG GET.
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageEngine {
        &mut self.storage
    }

    pub fn counters(&self) -> &ServerCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut ServerCounters {
        &mut self.counters
    }

    /// Executes a request and returns the reply.
    pub fn execute(&mut self, request: &Request) -> RespValue {
        self.counters.total_commands_processed += 1;
        trace!(command = %request.command, args = request.args.len(), "executing");
        self.dispatch(&request.command, &request.args)
    }

    /// Dispatches a command to its handler.
    fn dispatch(&mut self, cmd: &str, args: &[Bytes]) -> RespValue {
        match cmd {
            // String commands
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "INCR" => self.cmd_incr_by("incr", args, 1),
            "DECR" => self.cmd_incr_by("decr", args, -1),
            "INCRBY" => self.cmd_incrby(args),
            "DECRBY" => self.cmd_decrby(args),

            // Key commands
            "EXPIRE" => self.cmd_expire("expire", args, Duration::from_secs),
            "PEXPIRE" => self.cmd_expire("pexpire", args, Duration::from_millis),
            "TTL" => self.cmd_ttl(args),
            "PTTL" => self.cmd_pttl(args),
            "PERSIST" => self.cmd_persist(args),
            "KEYS" => self.cmd_keys(args),

            // Server commands
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "INFO" => self.cmd_info(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHDB" | "FLUSHALL" => self.cmd_flushdb(args),
            "COMMAND" => self.cmd_command(args),
            "CONFIG" => self.cmd_config(args),
            "TIME" => self.cmd_time(args),
            "QUIT" => RespValue::ok(),

            // Unknown command
            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    fn wrong_args(name: &str) -> RespValue {
        RespValue::error(format!(
            "ERR wrong number of arguments for '{}' command",
            name
        ))
    }

    /// Parses a base-10 integer argument.
    fn get_integer(value: &[u8]) -> Option<i64> {
        std::str::from_utf8(value).ok()?.parse().ok()
    }

    fn not_an_integer() -> RespValue {
        RespValue::error("ERR value is not an integer or out of range")
    }

    fn storage_error(name: &str, err: StorageError) -> RespValue {
        match err {
            StorageError::OutOfCapacity => {
                RespValue::error("OOM command not allowed when max keys reached")
            }
            StorageError::NotAnInteger => Self::not_an_integer(),
            StorageError::Overflow => RespValue::error("ERR increment or decrement would overflow"),
            StorageError::InvalidExpireTime => {
                RespValue::error(format!("ERR invalid expire time in '{}' command", name))
            }
        }
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// SET key value [EX seconds | PX milliseconds] [NX | XX]
    fn cmd_set(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return Self::wrong_args("set");
        }

        let key = args[0].clone();
        let value = args[1].clone();

        let mut ttl: Option<Duration> = None;
        let mut nx = false;
        let mut xx = false;

        let mut i = 2;
        while i < args.len() {
            let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
            match opt.as_str() {
                "EX" | "PX" if ttl.is_none() => {
                    i += 1;
                    let Some(raw) = args.get(i) else {
                        return RespValue::error("ERR syntax error");
                    };
                    let n = match Self::get_integer(raw) {
                        Some(n) if n > 0 => n as u64,
                        Some(_) => return RespValue::error("ERR invalid expire time in 'set' command"),
                        None => return Self::not_an_integer(),
                    };
                    ttl = Some(if opt == "EX" {
                        Duration::from_secs(n)
                    } else {
                        Duration::from_millis(n)
                    });
                }
                "NX" if !xx => nx = true,
                "XX" if !nx => xx = true,
                _ => return RespValue::error("ERR syntax error"),
            }
            i += 1;
        }

        if nx || xx {
            let exists = self.storage.exists(&key);
            if (nx && exists) || (xx && !exists) {
                return RespValue::null();
            }
        }

        let result = match ttl {
            Some(duration) => self.storage.set_with_ttl(key, value, duration),
            None => self.storage.set(key, value),
        };

        match result {
            Ok(_) => RespValue::ok(),
            Err(e) => Self::storage_error("set", e),
        }
    }

    /// GET key
    fn cmd_get(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_args("get");
        }

        match self.storage.get(&args[0]) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&mut self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return Self::wrong_args("del");
        }
        RespValue::integer(self.storage.delete_many(args) as i64)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&mut self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return Self::wrong_args("exists");
        }
        RespValue::integer(self.storage.exists_many(args) as i64)
    }

    /// INCR key / DECR key
    fn cmd_incr_by(&mut self, name: &str, args: &[Bytes], delta: i64) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_args(name);
        }

        match self.storage.incr_by(&args[0], delta) {
            Ok(n) => RespValue::integer(n),
            Err(e) => Self::storage_error(name, e),
        }
    }

    /// INCRBY key increment
    fn cmd_incrby(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_args("incrby");
        }

        match Self::get_integer(&args[1]) {
            Some(delta) => self.cmd_incr_by("incrby", &args[..1], delta),
            None => Self::not_an_integer(),
        }
    }

    /// DECRBY key decrement
    fn cmd_decrby(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_args("decrby");
        }

        match Self::get_integer(&args[1]).and_then(i64::checked_neg) {
            Some(delta) => self.cmd_incr_by("decrby", &args[..1], delta),
            None => Self::not_an_integer(),
        }
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// EXPIRE key seconds / PEXPIRE key milliseconds
    fn cmd_expire(
        &mut self,
        name: &str,
        args: &[Bytes],
        unit: fn(u64) -> Duration,
    ) -> RespValue {
        if args.len() != 2 {
            return Self::wrong_args(name);
        }

        let amount = match Self::get_integer(&args[1]) {
            Some(n) => n,
            None => return Self::not_an_integer(),
        };

        // Non-positive TTL deletes the key
        let applied = if amount <= 0 {
            self.storage.delete(&args[0])
        } else {
            match self.storage.expire(&args[0], unit(amount as u64)) {
                Ok(applied) => applied,
                Err(e) => return Self::storage_error(name, e),
            }
        };
        RespValue::integer(applied as i64)
    }

    /// TTL key
    fn cmd_ttl(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_args("ttl");
        }
        RespValue::integer(self.storage.ttl(&args[0]).unwrap_or(-2))
    }

    /// PTTL key
    fn cmd_pttl(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_args("pttl");
        }
        RespValue::integer(self.storage.pttl(&args[0]).unwrap_or(-2))
    }

    /// PERSIST key
    fn cmd_persist(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_args("persist");
        }
        RespValue::integer(self.storage.persist(&args[0]) as i64)
    }

    /// KEYS pattern
    fn cmd_keys(&mut self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return Self::wrong_args("keys");
        }

        let pattern = String::from_utf8_lossy(&args[0]);
        RespValue::string_array(self.storage.keys(&pattern))
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&mut self, args: &[Bytes]) -> RespValue {
        match args {
            [] => RespValue::pong(),
            [msg] => RespValue::bulk_string(msg.clone()),
            _ => Self::wrong_args("ping"),
        }
    }

    /// ECHO message
    fn cmd_echo(&mut self, args: &[Bytes]) -> RespValue {
        match args {
            [msg] => RespValue::bulk_string(msg.clone()),
            _ => Self::wrong_args("echo"),
        }
    }

    /// INFO
    fn cmd_info(&mut self, _args: &[Bytes]) -> RespValue {
        let stats = self.storage.stats();
        let config = self.storage.config();
        let uptime = self.start_time.elapsed().as_secs();
        let counters = self.counters;

        let info = format!(
            "# Server\r\n\
             emberkv_version:{}\r\n\
             os:{}\r\n\
             uptime_in_seconds:{}\r\n\
             \r\n\
             # Clients\r\n\
             connected_clients:{}\r\n\
             \r\n\
             # Stats\r\n\
             total_connections_received:{}\r\n\
             rejected_connections:{}\r\n\
             total_commands_processed:{}\r\n\
             expired_keys:{}\r\n\
             evicted_keys:{}\r\n\
             get_ops:{}\r\n\
             set_ops:{}\r\n\
             del_ops:{}\r\n\
             \r\n\
             # Memory\r\n\
             max_keys:{}\r\n\
             eviction_policy:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             db0:keys={},expires={}\r\n",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            uptime,
            counters.connected_clients,
            counters.total_connections_received,
            counters.rejected_connections,
            counters.total_commands_processed,
            stats.expired,
            stats.evicted,
            stats.get_ops,
            stats.set_ops,
            stats.del_ops,
            config.max_keys,
            config.eviction_policy,
            stats.keys,
            stats.expires,
        );

        RespValue::bulk_string(info)
    }

    /// DBSIZE
    fn cmd_dbsize(&mut self, _args: &[Bytes]) -> RespValue {
        RespValue::integer(self.storage.len() as i64)
    }

    /// FLUSHDB / FLUSHALL
    fn cmd_flushdb(&mut self, _args: &[Bytes]) -> RespValue {
        self.storage.flush();
        RespValue::ok()
    }

    /// COMMAND
    fn cmd_command(&mut self, _args: &[Bytes]) -> RespValue {
        RespValue::string_array(COMMANDS.iter().copied())
    }

    /// CONFIG GET pattern
    fn cmd_config(&mut self, args: &[Bytes]) -> RespValue {
        let Some(subcommand) = args.first() else {
            return Self::wrong_args("config");
        };

        match subcommand.to_ascii_uppercase().as_slice() {
            b"GET" => {
                if args.len() != 2 {
                    return Self::wrong_args("config|get");
                }
                let pattern = args[1].to_ascii_lowercase();
                let matches = self
                    .params
                    .iter()
                    .filter(|(name, _)| glob_match(&pattern, name.as_bytes()))
                    .flat_map(|(name, value)| [name.clone(), value.clone()]);
                RespValue::string_array(matches)
            }
            b"SET" => RespValue::error("ERR configuration is fixed at startup"),
            _ => RespValue::error(format!(
                "ERR unknown CONFIG subcommand '{}'",
                String::from_utf8_lossy(subcommand)
            )),
        }
    }

    /// TIME
    fn cmd_time(&mut self, _args: &[Bytes]) -> RespValue {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);

        RespValue::string_array([now.as_secs().to_string(), now.subsec_micros().to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EvictionPolicy, StorageConfig};

    fn create_handler() -> CommandHandler {
        CommandHandler::new(StorageEngine::new())
    }

    fn make_command(args: &[&str]) -> Request {
        Request::new(
            args[0],
            args[1..]
                .iter()
                .map(|s| Bytes::from(s.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_ping() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["PING"]));
        assert_eq!(response, RespValue::simple_string("PONG"));

        let response = handler.execute(&make_command(&["ping", "hello"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("hello")));
    }

    #[test]
    fn test_echo() {
        let mut handler = create_handler();
        let response = handler.execute(&make_command(&["ECHO", "hi"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("hi")));

        let response = handler.execute(&make_command(&["ECHO"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'echo' command")
        );
    }

    #[test]
    fn test_set_get() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["GET", "nonexistent"]));
        assert_eq!(response, RespValue::null());
        assert_eq!(response.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_del() {
        let mut handler = create_handler();

        handler.execute(&make_command(&["SET", "key1", "value1"]));
        handler.execute(&make_command(&["SET", "key2", "value2"]));

        let response = handler.execute(&make_command(&["DEL", "key1", "key2", "key3"]));
        assert_eq!(response, RespValue::integer(2));
    }

    #[test]
    fn test_exists() {
        let mut handler = create_handler();

        handler.execute(&make_command(&["SET", "key1", "value1"]));

        let response = handler.execute(&make_command(&["EXISTS", "key1", "key1", "nope"]));
        assert_eq!(response, RespValue::integer(2));

        let response = handler.execute(&make_command(&["EXISTS", "nonexistent"]));
        assert_eq!(response, RespValue::integer(0));
    }

    #[test]
    fn test_incr_decr() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["INCR", "counter"]));
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(&make_command(&["INCR", "counter"]));
        assert_eq!(response, RespValue::integer(2));

        let response = handler.execute(&make_command(&["DECR", "counter"]));
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(&make_command(&["INCRBY", "counter", "10"]));
        assert_eq!(response, RespValue::integer(11));

        let response = handler.execute(&make_command(&["DECRBY", "counter", "20"]));
        assert_eq!(response, RespValue::integer(-9));
    }

    #[test]
    fn test_incr_errors() {
        let mut handler = create_handler();
        handler.execute(&make_command(&["SET", "s", "abc"]));

        let response = handler.execute(&make_command(&["INCR", "s"]));
        assert_eq!(
            response,
            RespValue::error("ERR value is not an integer or out of range")
        );

        let response = handler.execute(&make_command(&["INCRBY", "n", "ten"]));
        assert!(response.is_error());

        handler.execute(&make_command(&["SET", "big", &i64::MAX.to_string()]));
        let response = handler.execute(&make_command(&["INCR", "big"]));
        assert_eq!(
            response,
            RespValue::error("ERR increment or decrement would overflow")
        );

        let response = handler.execute(&make_command(&["DECRBY", "n", &i64::MIN.to_string()]));
        assert!(response.is_error());
    }

    #[test]
    fn test_set_with_options() {
        let mut handler = create_handler();

        // SET with NX
        let response = handler.execute(&make_command(&["SET", "key", "value", "NX"]));
        assert_eq!(response, RespValue::ok());

        // SET with NX on existing key should return nil
        let response = handler.execute(&make_command(&["SET", "key", "newvalue", "NX"]));
        assert_eq!(response, RespValue::null());

        // SET with XX on existing key
        let response = handler.execute(&make_command(&["SET", "key", "newvalue", "xx"]));
        assert_eq!(response, RespValue::ok());

        // SET with XX on missing key
        let response = handler.execute(&make_command(&["SET", "other", "v", "XX"]));
        assert_eq!(response, RespValue::null());

        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("newvalue")));
    }

    #[test]
    fn test_set_option_errors() {
        let mut handler = create_handler();

        for args in [
            &["SET", "k", "v", "EX"][..],
            &["SET", "k", "v", "NX", "XX"],
            &["SET", "k", "v", "EX", "1", "PX", "100"],
            &["SET", "k", "v", "BOGUS"],
        ] {
            let response = handler.execute(&make_command(args));
            assert_eq!(response, RespValue::error("ERR syntax error"), "{:?}", args);
        }

        let response = handler.execute(&make_command(&["SET", "k", "v", "EX", "0"]));
        assert_eq!(
            response,
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(handler.storage().len(), 0);
    }

    #[test]
    fn test_set_with_expiry() {
        let mut handler = create_handler();

        handler.execute(&make_command(&["SET", "k", "v", "EX", "100"]));
        let response = handler.execute(&make_command(&["TTL", "k"]));
        assert!(matches!(response, RespValue::Integer(n) if (98..=100).contains(&n)));

        handler.execute(&make_command(&["SET", "p", "v", "PX", "30"]));
        std::thread::sleep(Duration::from_millis(60));
        let response = handler.execute(&make_command(&["GET", "p"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_expire_time_out_of_range() {
        let mut handler = create_handler();
        let huge = i64::MAX.to_string();

        let response = handler.execute(&make_command(&["SET", "k", "v", "EX", &huge]));
        assert_eq!(
            response,
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(handler.storage().len(), 0);

        handler.execute(&make_command(&["SET", "k", "v"]));
        let response = handler.execute(&make_command(&["EXPIRE", "k", &huge]));
        assert_eq!(
            response,
            RespValue::error("ERR invalid expire time in 'expire' command")
        );
        let response = handler.execute(&make_command(&["TTL", "k"]));
        assert_eq!(response, RespValue::integer(-1));
    }

    #[test]
    fn test_ttl_commands() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["TTL", "missing"]));
        assert_eq!(response, RespValue::integer(-2));

        handler.execute(&make_command(&["SET", "k", "v"]));
        let response = handler.execute(&make_command(&["PTTL", "k"]));
        assert_eq!(response, RespValue::integer(-1));

        let response = handler.execute(&make_command(&["PEXPIRE", "k", "100000"]));
        assert_eq!(response, RespValue::integer(1));
        let response = handler.execute(&make_command(&["PERSIST", "k"]));
        assert_eq!(response, RespValue::integer(1));
        let response = handler.execute(&make_command(&["TTL", "k"]));
        assert_eq!(response, RespValue::integer(-1));

        let response = handler.execute(&make_command(&["EXPIRE", "k", "0"]));
        assert_eq!(response, RespValue::integer(1));
        let response = handler.execute(&make_command(&["EXISTS", "k"]));
        assert_eq!(response, RespValue::integer(0));
    }

    #[test]
    fn test_keys() {
        let mut handler = create_handler();
        handler.execute(&make_command(&["SET", "user:1", "a"]));
        handler.execute(&make_command(&["SET", "user:2", "b"]));
        handler.execute(&make_command(&["SET", "session", "c"]));

        let RespValue::Array(mut keys) = handler.execute(&make_command(&["KEYS", "user:*"])) else {
            panic!("expected array");
        };
        keys.sort_by(|a, b| a.as_bytes().cmp(&b.as_bytes()));
        assert_eq!(
            keys,
            vec![
                RespValue::bulk_string(Bytes::from("user:1")),
                RespValue::bulk_string(Bytes::from("user:2")),
            ]
        );
    }

    #[test]
    fn test_dbsize() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["DBSIZE"]));
        assert_eq!(response, RespValue::integer(0));

        handler.execute(&make_command(&["SET", "key1", "value1"]));
        handler.execute(&make_command(&["SET", "key2", "value2"]));

        let response = handler.execute(&make_command(&["DBSIZE"]));
        assert_eq!(response, RespValue::integer(2));
    }

    #[test]
    fn test_flushdb() {
        let mut handler = create_handler();

        handler.execute(&make_command(&["SET", "key1", "value1"]));
        handler.execute(&make_command(&["SET", "key2", "value2"]));

        let response = handler.execute(&make_command(&["FLUSHALL"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(&make_command(&["DBSIZE"]));
        assert_eq!(response, RespValue::integer(0));
    }

    #[test]
    fn test_unknown_command() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["frobnicate"]));
        assert_eq!(
            response,
            RespValue::error("ERR unknown command 'FROBNICATE'")
        );
    }

    #[test]
    fn test_unknown_command_reply_is_one_frame() {
        let mut handler = create_handler();

        for request in [
            make_command(&["X\r\n+OK\r\n:"]),
            make_command(&["CONFIG", "X\r\n:1\r\n"]),
        ] {
            let wire = handler.execute(&request).serialize();
            let (value, consumed) = crate::protocol::decode(&wire).unwrap();
            assert!(value.is_error());
            assert_eq!(consumed, wire.len());
        }
    }

    #[test]
    fn test_wrong_arity() {
        let mut handler = create_handler();

        let response = handler.execute(&make_command(&["GET"]));
        assert_eq!(
            response.serialize(),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
        let response = handler.execute(&make_command(&["SET", "k"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_out_of_capacity() {
        let storage = StorageEngine::with_config(StorageConfig {
            max_keys: 1,
            eviction_policy: EvictionPolicy::NoEviction,
            ..StorageConfig::default()
        });
        let mut handler = CommandHandler::new(storage);

        assert_eq!(handler.execute(&make_command(&["SET", "a", "1"])), RespValue::ok());
        let response = handler.execute(&make_command(&["SET", "b", "1"]));
        assert_eq!(
            response,
            RespValue::error("OOM command not allowed when max keys reached")
        );
        let response = handler.execute(&make_command(&["INCR", "c"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_config_get() {
        let mut handler = create_handler().with_params(vec![
            ("maxkeys".to_string(), "100".to_string()),
            ("maxclients".to_string(), "20000".to_string()),
            ("port".to_string(), "6380".to_string()),
        ]);

        let response = handler.execute(&make_command(&["CONFIG", "GET", "port"]));
        assert_eq!(response, RespValue::string_array(["port", "6380"]));

        let response = handler.execute(&make_command(&["config", "get", "MAX*"]));
        assert_eq!(
            response,
            RespValue::string_array(["maxkeys", "100", "maxclients", "20000"])
        );

        let response = handler.execute(&make_command(&["CONFIG", "SET", "port", "1"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_info_and_counters() {
        let mut handler = create_handler();
        handler.counters_mut().connected_clients = 3;
        handler.execute(&make_command(&["SET", "k", "v"]));

        let response = handler.execute(&make_command(&["INFO"]));
        let text = String::from_utf8(response.as_bytes().unwrap().to_vec()).unwrap();
        assert!(text.contains("connected_clients:3\r\n"));
        assert!(text.contains("db0:keys=1,expires=0\r\n"));
        assert!(text.contains("eviction_policy:allkeys-random\r\n"));
        assert_eq!(handler.counters().total_commands_processed, 2);
    }

    #[test]
    fn test_time_and_command() {
        let mut handler = create_handler();

        let RespValue::Array(parts) = handler.execute(&make_command(&["TIME"])) else {
            panic!("expected array");
        };
        assert_eq!(parts.len(), 2);

        let RespValue::Array(names) = handler.execute(&make_command(&["COMMAND"])) else {
            panic!("expected array");
        };
        assert_eq!(names.len(), COMMANDS.len());
    }

    #[test]
    fn test_quit_replies_ok() {
        let mut handler = create_handler();
        assert_eq!(handler.execute(&make_command(&["QUIT"])), RespValue::ok());
    }
}
