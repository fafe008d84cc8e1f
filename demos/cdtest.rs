//! Test binary for CD drive access.
//!
//! Usage: cargo run --features libcdio --example cdtest [device] [--rip track output.wav]

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::uninlined_format_args
)]

use std::{
    env,
    fs::File,
    io::{self, BufWriter, Read, Write},
};

use audiocd::{
    AudioCd, DriveOptions, MessageDest, TrackPosition, BITS_PER_SAMPLE, BYTES_PER_SAMPLE,
    BYTES_PER_SECTOR, CHANNELS, SAMPLE_RATE, SECTORS_PER_SECOND,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut device: Option<&str> = None;
    let mut rip_track: Option<u8> = None;
    let mut output_file: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rip" => {
                if i + 2 >= args.len() {
                    eprintln!("Usage: --rip <track> <output.wav>");
                    std::process::exit(1);
                }
                rip_track = Some(args[i + 1].parse()?);
                output_file = Some(&args[i + 2]);
                i += 3;
            }
            "--help" | "-h" => {
                println!("Usage: cdtest [device] [--rip track output.wav]");
                println!();
                println!("Options:");
                println!("  device          CD device path (e.g., /dev/sr0)");
                println!("  --rip N FILE    Rip track N to FILE (WAV format)");
                println!("  --help          Show this help");
                return Ok(());
            }
            arg if !arg.starts_with('-') && device.is_none() => {
                device = Some(arg);
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                std::process::exit(1);
            }
        }
    }

    println!("Opening CD drive...");
    let mut cd = AudioCd::new(DriveOptions {
        device: device.map(String::from),
        error_dest: MessageDest::PrintIt,
        ..DriveOptions::default()
    });
    cd.open()?;

    println!();
    println!("=== Disc Information ===");
    println!("Drive: {}", cd.model());
    println!("Tracks: {}", cd.track_count()?);

    let total_sectors = cd.length_sectors()?;
    println!("Total length: {}", format_duration(total_sectors));

    let toc = cd.toc()?;
    println!();
    println!("=== Track List ===");
    for track in &toc {
        println!(
            "  Track {:2}: sectors {:6} - {:6} ({}) {}{}",
            track.track,
            track.start_sector,
            track.end_sector() - 1,
            format_duration(u64::from(track.length_sectors)),
            if track.is_audio() { "[AUDIO]" } else { "[DATA]" },
            if track.is_preemphasis_enabled() { " [PRE]" } else { "" }
        );
    }

    if let (Some(track), Some(output)) = (rip_track, output_file) {
        let position = toc
            .iter()
            .find(|t| t.track == track)
            .ok_or_else(|| format!("Invalid track number: {}", track))?;
        if !position.is_audio() {
            return Err(format!("Track {} is not an audio track", track).into());
        }
        println!();
        println!("=== Ripping Track {} ===", track);
        rip_track_to_wav(&mut cd, position, output)?;
    }

    cd.close()?;
    Ok(())
}

fn format_duration(sectors: u64) -> String {
    let seconds = sectors as f64 / SECTORS_PER_SECOND as f64;
    format!("{}:{:05.2}", (seconds / 60.0) as u64, seconds % 60.0)
}

fn rip_track_to_wav(
    cd: &mut AudioCd,
    track: &TrackPosition,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let total_sectors = track.length_sectors as usize;
    println!("Track {}: {} sectors", track.track, total_sectors);
    println!("Output: {}", output_path);

    cd.seek_to_sector(track.start_sector as u64)?;

    let mut file = BufWriter::new(File::create(output_path)?);
    write_wav_header(&mut file, track.length_bytes() as u32)?;

    let mut sector = vec![0u8; BYTES_PER_SECTOR];
    let start_time = std::time::Instant::now();

    for sectors_read in 1..=total_sectors {
        cd.read_exact(&mut sector)?;
        file.write_all(&sector)?;

        if sectors_read % 100 == 0 {
            let percent = (sectors_read * 100) / total_sectors;
            let rate = sectors_read as f64 / start_time.elapsed().as_secs_f64();
            print!(
                "\rProgress: {}% ({} sectors, {:.1} sectors/sec)  ",
                percent, sectors_read, rate
            );
            io::stdout().flush()?;
        }
    }
    file.flush()?;

    let elapsed = start_time.elapsed();
    println!(
        "\rCompleted: {} sectors in {:.1}s ({:.1} sectors/sec)     ",
        total_sectors,
        elapsed.as_secs_f64(),
        total_sectors as f64 / elapsed.as_secs_f64()
    );

    Ok(())
}

fn write_wav_header<W: Write>(out: &mut W, data_size: u32) -> io::Result<()> {
    let block_align = (CHANNELS * BYTES_PER_SAMPLE) as u16;

    // RIFF header
    out.write_all(b"RIFF")?;
    out.write_all(&(data_size + 36).to_le_bytes())?; // File size - 8
    out.write_all(b"WAVE")?;

    // fmt chunk
    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?; // Chunk size
    out.write_all(&1u16.to_le_bytes())?; // PCM
    out.write_all(&(CHANNELS as u16).to_le_bytes())?;
    out.write_all(&(SAMPLE_RATE as u32).to_le_bytes())?;
    out.write_all(&((SAMPLE_RATE * CHANNELS * BYTES_PER_SAMPLE) as u32).to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&(BITS_PER_SAMPLE as u16).to_le_bytes())?;

    // data chunk
    out.write_all(b"data")?;
    out.write_all(&data_size.to_le_bytes())?;

    Ok(())
}
