//! Commands that talk to one wallet.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use keepkey_client::{DeviceFamily, Expect, Message, MessageType};
use sha2::{Digest, Sha256};

use super::Context;

/// Wipe the device; succeeds once it reports "Device wiped"
pub async fn wipe(ctx: &Context) -> Result<()> {
    let (manager, session) = ctx.connect().await?;

    eprintln!("Confirm the wipe on the device...");
    let pending = session.wipe_device().await?;
    ctx.wait(pending, Expect::success_message("Device wiped"))
        .await
        .context("wipe failed")?;

    println!("Device wiped");
    manager.registry().clear().await;
    Ok(())
}

/// Print the device features as JSON
pub async fn features(ctx: &Context) -> Result<()> {
    let (manager, session) = ctx.connect().await?;

    let pending = session.initialize_request().await?;
    let reply = ctx.wait(pending, MessageType::Features).await?;
    if let Message::Features(features) = reply {
        println!("{}", serde_json::to_string_pretty(&features)?);
    }

    manager.registry().clear().await;
    Ok(())
}

pub async fn ping(ctx: &Context, text: &str) -> Result<()> {
    let (manager, session) = ctx.connect().await?;

    let pending = session.ping(text).await?;
    let reply = ctx.wait(pending, Expect::success_message(text)).await?;
    println!("{}", reply.to_json());

    manager.registry().clear().await;
    Ok(())
}

/// Image header magic per family
fn image_magic(family: DeviceFamily) -> &'static [u8; 4] {
    match family {
        DeviceFamily::KeepKey => b"KPKY",
        DeviceFamily::Trezor => b"TRZR",
    }
}

fn check_image(family: DeviceFamily, image: &[u8]) -> Result<()> {
    let magic = image_magic(family);
    if !image.starts_with(magic) {
        bail!(
            "not a {} firmware image (expected header {:?})",
            family,
            String::from_utf8_lossy(magic)
        );
    }
    Ok(())
}

/// Erase (optionally) and upload a firmware image
pub async fn firmware(ctx: &Context, file: &Path, erase: bool) -> Result<()> {
    let image =
        std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    let (manager, session) = ctx.connect().await?;
    check_image(session.family(), &image)?;

    // Polling sends Initialize first; give the Features a chance to land
    let pending = session.initialize_request().await?;
    ctx.wait(pending, MessageType::Features).await?;
    if session.features().and_then(|f| f.bootloader_mode) != Some(true) {
        bail!("device is not in bootloader mode");
    }

    println!(
        "Image: {} bytes, sha256 {}",
        image.len(),
        hex::encode(Sha256::digest(&image))
    );

    if erase {
        eprintln!("Erasing...");
        let pending = session.firmware_erase().await?;
        ctx.wait(pending, MessageType::Success)
            .await
            .context("erase failed")?;
    }

    eprintln!("Uploading...");
    let pending = session.firmware_upload(image).await?;
    ctx.wait(pending, MessageType::Success)
        .await
        .context("upload failed")?;

    println!("Firmware uploaded");
    manager.registry().clear().await;
    Ok(())
}
