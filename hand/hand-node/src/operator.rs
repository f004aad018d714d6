//! Line commands for the interactive calibration session.

use hand_calibration::OperatorEvent;
use hand_types::{ActuatorId, JointId};

/// Help text printed by `help`.
pub const HELP: &str = "\
procedures:
  range [ch..]          start range finding (default: every wired channel)
  tendon [joint..]      start tendon calibration (default: every joint)
  verify                start the verification sweep
  commit | abort        finish or discard the active procedure
range stage:
  drive <ch> <us>       command an absolute pulse
  nudge <ch> <+-us>     move relative to the last pulse
  min <ch> | max <ch>   record the current pulse as an extreme
  ack <ch>              accept the recorded extremes
tendon stage:
  warmup <joint>        cycle min, max, center three times
  drive/nudge <joint> ..  same as above, addressed by joint
  taut <joint> | curled <joint> | slack <joint>
  test <joint>          replay slack, taut, curled, taut
  confirm <joint>
verification:
  step                  play the next sweep position
  pass | fail           record the verdict
other:
  status | help | quit";

/// One parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start range finding on these channels.
    BeginRange(Vec<ActuatorId>),
    /// Start tendon calibration on these joints.
    BeginTendon(Vec<JointId>),
    /// Start the verification sweep.
    BeginVerify,
    /// Forward an event to the active procedure.
    Event(OperatorEvent),
    /// Persist the active procedure.
    Commit,
    /// Discard the active procedure.
    Abort,
    /// Print the record and the active procedure.
    Status,
    /// Print [`HELP`].
    Help,
    /// Leave the session.
    Quit,
}

/// Parses one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let command = match (verb, args.as_slice()) {
        ("range", channels) => Command::BeginRange(if channels.is_empty() {
            ActuatorId::wired().collect()
        } else {
            channels.iter().map(|c| channel(c)).collect::<Result<_, _>>()?
        }),
        ("tendon", joints) => Command::BeginTendon(if joints.is_empty() {
            JointId::ALL.to_vec()
        } else {
            joints.iter().map(|j| joint(j)).collect::<Result<_, _>>()?
        }),
        ("verify", []) => Command::BeginVerify,
        ("commit", []) => Command::Commit,
        ("abort", []) => Command::Abort,
        ("status", []) => Command::Status,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        ("drive", [target, pulse]) => Command::Event(OperatorEvent::Drive {
            actuator: target_channel(target)?,
            pulse_us: pulse
                .parse()
                .map_err(|_| format!("invalid pulse '{pulse}'"))?,
        }),
        ("nudge", [target, delta]) => Command::Event(OperatorEvent::Nudge {
            actuator: target_channel(target)?,
            delta_us: delta
                .parse()
                .map_err(|_| format!("invalid step '{delta}'"))?,
        }),
        ("min", [ch]) => Command::Event(OperatorEvent::MarkMin(channel(ch)?)),
        ("max", [ch]) => Command::Event(OperatorEvent::MarkMax(channel(ch)?)),
        ("ack", [ch]) => Command::Event(OperatorEvent::Acknowledge(channel(ch)?)),
        ("taut", [j]) => Command::Event(OperatorEvent::MarkTaut(joint(j)?)),
        ("curled", [j]) => Command::Event(OperatorEvent::MarkCurled(joint(j)?)),
        ("slack", [j]) => Command::Event(OperatorEvent::MarkSlack(joint(j)?)),
        ("warmup", [j]) => Command::Event(OperatorEvent::Warmup(joint(j)?)),
        ("test", [j]) => Command::Event(OperatorEvent::TestJoint(joint(j)?)),
        ("confirm", [j]) => Command::Event(OperatorEvent::ConfirmJoint(joint(j)?)),
        ("step", []) => Command::Event(OperatorEvent::SweepStep),
        ("pass", []) => Command::Event(OperatorEvent::Verdict(true)),
        ("fail", []) => Command::Event(OperatorEvent::Verdict(false)),
        (verb, _) => {
            return Err(format!(
                "unknown command or wrong arguments: '{verb}' (try 'help')"
            ));
        }
    };
    Ok(Some(command))
}

/// `ch3` or `3`.
fn channel(word: &str) -> Result<ActuatorId, String> {
    let digits = word.strip_prefix("ch").unwrap_or(word);
    let n: u8 = digits
        .parse()
        .map_err(|_| format!("invalid channel '{word}'"))?;
    ActuatorId::new(n).map_err(|e| e.to_string())
}

fn joint(word: &str) -> Result<JointId, String> {
    word.parse().map_err(|e: hand_types::HandError| e.to_string())
}

/// A channel, or a joint name standing for its actuator.
fn target_channel(word: &str) -> Result<ActuatorId, String> {
    channel(word).or_else(|_| joint(word).map(JointId::actuator))
}
