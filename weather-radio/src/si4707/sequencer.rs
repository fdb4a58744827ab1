//! Power-up, firmware patch and configuration sequencing.
//!
//! ```text
//! Off -> Powering(normal | patch) -> [PatchUploading] -> On -> Configuring -> ready
//! ```
//!
//! Each power transition is one session transaction, so nothing else can
//! reach the bus between POWER_UP, the patch script and the final settle.
//! Transitions into the state the chip is already in send nothing.

use super::error::Result;
use super::patch::PATCH_SCRIPT;
use super::protocol::{asq, delay, int_enable, property, same, Command, PowerUpMode, Revision, WbChannel};
use super::session::{ChipSession, PowerState, Step, Transaction};
use crate::tracing::prelude::*;

/// Interrupt sources routed to GPO2/INT.
pub const GPO_INTERRUPTS: u16 = int_enable::ERRIEN
    | int_enable::RSQIEN
    | int_enable::SAMEIEN
    | int_enable::ASQIEN
    | int_enable::STCIEN;

/// SAME events that raise SAMEINT.
pub const SAME_INTERRUPTS: u16 =
    same::HDRRDYIEN | same::PREDETIEN | same::SOMDETIEN | same::EOMDETIEN;

/// Alert tone events that raise ASQINT.
pub const ASQ_INTERRUPTS: u16 = asq::ALERTONIEN;

/// Power up without the patch. Returns false if already on.
pub async fn power_on(session: &ChipSession) -> Result<bool> {
    let mut txn = Transaction::new("power-on");
    txn.push_command(&Command::PowerUp {
        mode: PowerUpMode::Normal,
    });
    debug!("Powering up in normal mode");
    session.transition(PowerState::On, txn).await
}

/// Power up in patch mode and upload the errata patch. Returns false if
/// already on.
pub async fn power_on_patched(session: &ChipSession) -> Result<bool> {
    let mut txn = Transaction::new("power-on-patched");
    txn.push_command(&Command::PowerUp {
        mode: PowerUpMode::Patch,
    });
    for (kind, data) in PATCH_SCRIPT.iter() {
        txn.push_command(&Command::Patch {
            kind: *kind,
            data: *data,
        });
    }
    txn.push(Step::Settle(delay::POWER_SETTLE));

    debug!(commands = PATCH_SCRIPT.len(), "Powering up in patch mode");
    let changed = session.transition(PowerState::On, txn).await?;
    if changed {
        debug!("Patch finished");
    }
    Ok(changed)
}

/// Power down. Returns false if already off.
pub async fn power_off(session: &ChipSession) -> Result<bool> {
    let txn = Transaction::command(&Command::PowerDown);
    session.transition(PowerState::Off, txn).await
}

/// Route the interrupt sources the dispatcher handles to the INT line.
pub async fn configure_interrupts(session: &ChipSession) -> Result<()> {
    let mut txn = Transaction::new("configure-interrupts");
    for (property, value) in [
        (property::GPO_IEN, GPO_INTERRUPTS),
        (property::WB_SAME_INTERRUPT_SOURCE, SAME_INTERRUPTS),
        (property::WB_ASQ_INT_SOURCE, ASQ_INTERRUPTS),
    ] {
        txn.push_command(&Command::SetProperty { property, value });
    }
    session.submit(txn).await?;
    debug!(
        gpo = format_args!("0x{:04x}", GPO_INTERRUPTS),
        same = format_args!("0x{:04x}", SAME_INTERRUPTS),
        asq = format_args!("0x{:04x}", ASQ_INTERRUPTS),
        "Interrupt sources configured"
    );
    Ok(())
}

/// Bring the chip from off to receiving on `channel`: power up (patched
/// if asked), route interrupts, mute, take AGC override and tune.
///
/// The board must already have pulsed the reset line.
pub async fn bring_up(session: &ChipSession, channel: WbChannel, patch: bool) -> Result<Revision> {
    if patch {
        power_on_patched(session).await?;
    } else {
        power_on(session).await?;
    }

    configure_interrupts(session).await?;

    let revision = session.revision().await?;
    info!(%revision, "Receiver powered up");

    session.set_muted(true).await?;
    session.set_agc_disabled(true).await?;

    info!(%channel, "Tuning");
    session.tune(channel).await?;
    Ok(revision)
}
