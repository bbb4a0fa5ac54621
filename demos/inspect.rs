use clap::{arg, command};
use kmemview::{Address, DumpHeader, KernelHandle};

use std::fs::File;
use std::io::Read;

fn parse_hex(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let matches = command!()
        .arg(arg!(<dump> "ELF core image to open"))
        .arg(arg!(--root <ADDR> "root page-table physical address, hex").required(true))
        .arg(arg!(--va <ADDR> "kernel virtual address to translate").required(true))
        .get_matches();

    let path = matches.get_one::<String>("dump").unwrap();
    let root = parse_hex(matches.get_one::<String>("root").unwrap())?;
    let va = parse_hex(matches.get_one::<String>("va").unwrap())?;

    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let header = DumpHeader::from_elf_core(&bytes, Address::new(root))?;

    println!("arch: {:?}", header.arch);
    for seg in &header.segments {
        println!("  segment {:x} +{:x}", seg.start, seg.len);
    }

    let mut kd = KernelHandle::open_dead(File::open(path)?, header);
    match kd.translate(Address::new(va)) {
        Ok((pa, run)) => println!("{:#x} -> {:#x} ({:#x} bytes contiguous)", va, pa, run),
        Err(_) => println!("translate failed: {}", kd.last_error_message()),
    }

    Ok(())
}
