//! Engine Process Driver (SPEC_FULL.md §4.A).
//!
//! A subprocess with piped stdio, a background reader thread pushing
//! decoded lines through an `mpsc` channel, and a `Drop`-based
//! graceful-then-forced shutdown. Generalized to carry a `Protocol`
//! (UCI-like or Piskvork-like) and a per-driver character encoding instead
//! of assuming USI/UTF-8.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use encoding_rs::{Encoding, GB18030, UTF_8};

use super::piskvork;
use super::uci;

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_GRACE: Duration = Duration::from_millis(500);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const STOP_HARD_CAP: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Uci,
    Piskvork,
}

/// GB2312 is a strict subset of GB18030; `encoding_rs` only ships the
/// superset decoder, which is byte-compatible for every GB2312 codepoint.
fn encoding_for(protocol: Protocol, variant_is_chess_or_jieqi_utf8: bool) -> &'static Encoding {
    match protocol {
        Protocol::Piskvork => GB18030,
        Protocol::Uci if !variant_is_chess_or_jieqi_utf8 => GB18030,
        Protocol::Uci => UTF_8,
    }
}

pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub protocol: Protocol,
    /// `true` for chess (UTF-8 stdio); `false` for xiangqi/jieqi/gomoku (GB2312).
    pub utf8_stdio: bool,
    pub options: Vec<(String, String)>,
}

/// One live engine subprocess plus its wire protocol.
pub struct EngineDriver {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    protocol: Protocol,
    pub label: String,
    alive: bool,
}

impl EngineDriver {
    pub fn spawn(cfg: &EngineConfig, label: String) -> Result<Self> {
        let mut cmd = Command::new(&cfg.path);
        if !cfg.args.is_empty() {
            cmd.args(&cfg.args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", cfg.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;

        let encoding = encoding_for(cfg.protocol, cfg.utf8_stdio);
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match read_line_bytes(&mut reader, &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let (text, _, _) = encoding.decode(&buf);
                        if tx.send(text.trim_end().to_string()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut driver = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            protocol: cfg.protocol,
            label,
            alive: true,
        };
        driver.initialize(cfg)?;
        Ok(driver)
    }

    fn initialize(&mut self, cfg: &EngineConfig) -> Result<()> {
        match self.protocol {
            Protocol::Uci => {
                self.write_line(uci::HANDSHAKE)?;
                loop {
                    let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
                    if line == uci::HANDSHAKE_OK {
                        break;
                    }
                }
                for (name, value) in &cfg.options {
                    self.write_line(&uci::set_option(name, value))?;
                }
                self.sync_ready()?;
                self.write_line(uci::NEW_GAME)?;
            }
            Protocol::Piskvork => {
                for (name, value) in &cfg.options {
                    self.write_line(&piskvork::info(name, value))?;
                }
            }
        }
        Ok(())
    }

    /// §4.A `configure(options)`: send a batch with no reply expected.
    pub fn configure(&mut self, options: &[(String, String)]) -> Result<()> {
        for (name, value) in options {
            match self.protocol {
                Protocol::Uci => self.write_line(&uci::set_option(name, value))?,
                Protocol::Piskvork => self.write_line(&piskvork::info(name, value))?,
            }
        }
        // Give the engine a moment to absorb settings before the next command.
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    /// §4.A `new_game()`.
    pub fn new_game(&mut self) -> Result<()> {
        match self.protocol {
            Protocol::Uci => {
                self.write_line(uci::NEW_GAME)?;
                self.sync_ready()
            }
            Protocol::Piskvork => Ok(()), // START/BOARD re-issues state per game.
        }
    }

    pub fn sync_ready(&mut self) -> Result<()> {
        self.write_line(uci::IS_READY)?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line == uci::READY_OK {
                break;
            }
        }
        Ok(())
    }

    /// §4.A `go(limits)`. `position_cmd`/`board_cmd` is the already-encoded
    /// position/board command for the active protocol (built by the match
    /// engine via `encode_position`/`Variant`), matching §4.B's remark that
    /// the common loop resends full history except where incremental `turn`
    /// applies.
    pub fn go(
        &mut self,
        position_cmd: &str,
        limits: &uci::GoLimits,
        deadline: Duration,
    ) -> Result<EngineReply> {
        match self.protocol {
            Protocol::Uci => self.go_uci(position_cmd, limits, deadline),
            Protocol::Piskvork => bail!("go() is UCI-only; use turn()/board() for piskvork"),
        }
    }

    fn go_uci(
        &mut self,
        position_cmd: &str,
        limits: &uci::GoLimits,
        deadline: Duration,
    ) -> Result<EngineReply> {
        self.write_line(position_cmd)?;
        self.write_line(&uci::go_command(limits))?;
        self.wait_for_bestmove(deadline)
    }

    /// Piskvork incremental move (`TURN x,y`).
    pub fn turn(&mut self, coord: &str, deadline: Duration) -> Result<EngineReply> {
        self.write_line(&piskvork::turn(coord))?;
        self.wait_for_bestmove(deadline)
    }

    /// Piskvork full board (`BOARD ... DONE`).
    pub fn board(&mut self, stones: &str, deadline: Duration) -> Result<EngineReply> {
        self.write_line(&piskvork::board(stones))?;
        self.wait_for_bestmove(deadline)
    }

    fn wait_for_bestmove(&mut self, deadline: Duration) -> Result<EngineReply> {
        let start = Instant::now();
        let mut reply = EngineReply::default();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                reply.timed_out = true;
                return Ok(reply);
            }
            match self.rx.recv_timeout(deadline - elapsed) {
                Ok(line) => {
                    if self.apply_line(&line, &mut reply)? {
                        return Ok(reply);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    reply.timed_out = true;
                    return Ok(reply);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.alive = false;
                    bail!("{}: engine exited unexpectedly", self.label);
                }
            }
        }
    }

    /// Returns `true` once `reply` holds a terminal bestmove/coordinate.
    fn apply_line(&mut self, line: &str, reply: &mut EngineReply) -> Result<bool> {
        match self.protocol {
            Protocol::Uci => {
                if let Some(info) = uci::parse_info(line) {
                    reply.merge_info(info);
                    return Ok(false);
                }
                if let Some(mv) = uci::parse_bestmove(line) {
                    reply.bestmove = Some(mv);
                    return Ok(true);
                }
                Ok(false)
            }
            Protocol::Piskvork => match piskvork::parse_line(line) {
                piskvork::Incoming::Info(info) => {
                    reply.merge_piskvork_info(info);
                    Ok(false)
                }
                piskvork::Incoming::BestMove(coord) => {
                    reply.bestmove = Some(coord);
                    Ok(true)
                }
                piskvork::Incoming::Error(msg) | piskvork::Incoming::Unknown(msg) => {
                    bail!("{}: engine reported {}", self.label, msg)
                }
                piskvork::Incoming::Other => Ok(false),
            },
        }
    }

    /// §4.A `stop()`: send a stop signal, wait for the pending bestmove with
    /// a 2-second hard cap.
    pub fn stop(&mut self) -> Result<()> {
        match self.protocol {
            Protocol::Uci => self.write_line(uci::STOP)?,
            Protocol::Piskvork => self.write_line(piskvork::STOP)?,
        }
        let start = Instant::now();
        while start.elapsed() < STOP_HARD_CAP {
            match self.rx.recv_timeout(STOP_HARD_CAP - start.elapsed()) {
                Ok(line) => {
                    let mut discard = EngineReply::default();
                    if self.apply_line(&line, &mut discard).unwrap_or(false) {
                        return Ok(());
                    }
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// §4.A `quit(grace)`: quit line, graduated kill.
    pub fn quit(&mut self, grace: Duration) -> Result<()> {
        match self.protocol {
            Protocol::Uci => {
                let _ = self.write_line(uci::QUIT);
            }
            Protocol::Piskvork => {
                let _ = self.write_line(piskvork::END);
            }
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                self.alive = false;
                return Ok(());
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.alive = false;
        Ok(())
    }

    pub fn is_alive(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {
                self.alive = false;
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    pub fn recv_line(&self, timeout: Duration) -> Result<String> {
        self.rx
            .recv_timeout(timeout)
            .map_err(|_| anyhow!("{}: engine read timeout", self.label))
    }

    pub fn write_line(&mut self, msg: &str) -> Result<()> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }
}

impl Drop for EngineDriver {
    fn drop(&mut self) {
        let _ = self.quit(ENGINE_QUIT_GRACE);
    }
}

/// Read one `\n`-terminated line as raw bytes (no UTF-8 assumption — the
/// caller decodes with the driver's configured encoding).
fn read_line_bytes<R: Read>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    reader.read_until(b'\n', buf)
}

/// Structured reply to a `go`/`turn`/`board` call (§4.A `go()` contract).
#[derive(Debug, Clone, Default)]
pub struct EngineReply {
    pub bestmove: Option<String>,
    pub score_cp: Option<i32>,
    pub mate: Option<i32>,
    pub pv: Vec<String>,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub hashfull: Option<u32>,
    pub time_ms: Option<u64>,
    pub timed_out: bool,
}

impl EngineReply {
    fn merge_info(&mut self, info: uci::InfoLine) {
        if info.score_cp.is_some() {
            self.score_cp = info.score_cp;
        }
        if info.mate.is_some() {
            self.mate = info.mate;
        }
        if !info.pv.is_empty() {
            self.pv = info.pv;
        }
        self.depth = info.depth.or(self.depth);
        self.seldepth = info.seldepth.or(self.seldepth);
        self.nodes = info.nodes.or(self.nodes);
        self.nps = info.nps.or(self.nps);
        self.hashfull = info.hashfull.or(self.hashfull);
        self.time_ms = info.time_ms.or(self.time_ms);
    }

    fn merge_piskvork_info(&mut self, info: piskvork::InfoLine) {
        self.score_cp = info.eval.or(self.score_cp);
        self.mate = info.mate.or(self.mate);
        if let Some(line) = info.bestline {
            self.pv = line;
        }
        self.depth = info.depth.or(self.depth);
        self.seldepth = info.seldepth.or(self.seldepth);
        self.nodes = info.nodes.or(self.nodes);
        self.time_ms = info.totaltime.or(self.time_ms);
    }
}
