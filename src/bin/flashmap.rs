use flashmap::{
    Area, AreaDescriptor, AreaTable, DeviceError, ErrorKind, FlashDevice, PageLayout, Sector,
};
use log::{debug, info, warn, LevelFilter};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use structopt::StructOpt;

/// Flash image held in memory and written back to disk when modified.
struct FileDevice {
    data: RefCell<Vec<u8>>,
    dirty: Cell<bool>,
    write_block_size: usize,
    erase_value: u8,
    layout: [PageLayout; 1],
}

impl FileDevice {
    fn load(opt: &Opt) -> Result<Self, CliError> {
        if opt.page_size == 0 || opt.write_block == 0 {
            return Err(CliError::Config("page and write block sizes must be non-zero".into()));
        }
        let data = if opt.image.exists() {
            let data = fs::read(&opt.image)?;
            if data.len() != opt.capacity {
                warn!(
                    "image is 0x{:x} bytes, ignoring capacity 0x{:x}",
                    data.len(),
                    opt.capacity
                );
            }
            data
        } else {
            info!("creating blank image of 0x{:x} bytes", opt.capacity);
            vec![opt.erase_value; opt.capacity]
        };

        let layout = [PageLayout {
            pages_count: data.len() / opt.page_size,
            pages_size: opt.page_size,
        }];
        Ok(FileDevice {
            data: RefCell::new(data),
            dirty: Cell::new(false),
            write_block_size: opt.write_block,
            erase_value: opt.erase_value,
            layout,
        })
    }

    fn capacity(&self) -> usize {
        self.data.borrow().len()
    }

    fn save(&self, opt: &Opt) -> Result<(), CliError> {
        if self.dirty.get() {
            debug!("saving {}", opt.image.display());
            fs::write(&opt.image, &*self.data.borrow())?;
        }
        Ok(())
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, DeviceError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(offset..end),
            _ => Err(DeviceError(-libc::EINVAL)),
        }
    }
}

impl FlashDevice for FileDevice {
    fn is_ready(&self) -> bool {
        true
    }

    fn read(&self, offset: usize, data: &mut [u8]) -> Result<(), DeviceError> {
        let range = self.range(offset, data.len())?;
        data.copy_from_slice(&self.data.borrow()[range]);
        Ok(())
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
        let range = self.range(offset, data.len())?;
        self.data.borrow_mut()[range].copy_from_slice(data);
        self.dirty.set(true);
        Ok(())
    }

    fn erase(&self, offset: usize, len: usize) -> Result<(), DeviceError> {
        let range = self.range(offset, len)?;
        self.data.borrow_mut()[range].fill(self.erase_value);
        self.dirty.set(true);
        Ok(())
    }

    fn write_block_size(&self) -> usize {
        self.write_block_size
    }

    fn erase_value(&self) -> u8 {
        self.erase_value
    }

    fn page_layout(&self) -> &[PageLayout] {
        &self.layout
    }
}

#[derive(Debug)]
enum CliError {
    Config(String),
    Io(std::io::Error),
    Flash(ErrorKind),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => libc::EINVAL,
            CliError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            CliError::Flash(err) => -err.errno(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Io(err) => write!(f, "{}", err),
            CliError::Flash(err) => write!(f, "{}", err),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<ErrorKind> for CliError {
    fn from(err: ErrorKind) -> Self {
        CliError::Flash(err)
    }
}

fn parse_num(src: &str) -> Result<usize, String> {
    let parsed = match src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => src.parse(),
    };
    parsed.map_err(|e| format!("bad number '{}': {}", src, e))
}

fn parse_byte(src: &str) -> Result<u8, String> {
    let value = parse_num(src)?;
    u8::try_from(value).map_err(|_| format!("{} does not fit in a byte", value))
}

/// One `id:offset:size[:label]` partition from the command line.
#[derive(Debug)]
struct AreaArg {
    id: u8,
    offset: usize,
    size: usize,
    label: Option<String>,
}

fn parse_area(src: &str) -> Result<AreaArg, String> {
    let mut fields = src.splitn(4, ':');
    let mut next = |name: &str| {
        fields
            .next()
            .ok_or_else(|| format!("area '{}' is missing its {}", src, name))
    };
    let id = parse_byte(next("id")?)?;
    let offset = parse_num(next("offset")?)?;
    let size = parse_num(next("size")?)?;
    let label = fields.next().map(String::from);
    Ok(AreaArg {
        id,
        offset,
        size,
        label,
    })
}

#[derive(StructOpt)]
#[structopt(name = "flashmap", about = "Inspect and modify the flash areas of an image file")]
struct Opt {
    /// Log more, repeat for trace output.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    /// Flash image, created blank if missing.
    #[structopt(long, parse(from_os_str))]
    image: PathBuf,

    #[structopt(long, default_value = "0x100000", parse(try_from_str = parse_num))]
    capacity: usize,

    #[structopt(long, default_value = "4", parse(try_from_str = parse_num))]
    write_block: usize,

    #[structopt(long, default_value = "0xff", parse(try_from_str = parse_byte))]
    erase_value: u8,

    #[structopt(long, default_value = "0x1000", parse(try_from_str = parse_num))]
    page_size: usize,

    /// Partition as id:offset:size[:label], may be repeated.
    #[structopt(long = "area", number_of_values = 1, parse(try_from_str = parse_area))]
    areas: Vec<AreaArg>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Show the partition table.
    List,
    /// Hex dump part of an area.
    Read {
        #[structopt(parse(try_from_str = parse_byte))]
        id: u8,
        #[structopt(parse(try_from_str = parse_num))]
        offset: usize,
        #[structopt(parse(try_from_str = parse_num))]
        len: usize,
    },
    /// Program a file's contents into an area.
    Write {
        #[structopt(parse(try_from_str = parse_byte))]
        id: u8,
        #[structopt(parse(try_from_str = parse_num))]
        offset: usize,
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    Erase {
        #[structopt(parse(try_from_str = parse_byte))]
        id: u8,
        #[structopt(parse(try_from_str = parse_num))]
        offset: usize,
        #[structopt(parse(try_from_str = parse_num))]
        len: usize,
    },
    /// CRC-32 of a whole area.
    Crc {
        #[structopt(parse(try_from_str = parse_byte))]
        id: u8,
    },
    Sectors {
        #[structopt(parse(try_from_str = parse_byte))]
        id: u8,
    },
    /// Erase the destination area and copy the source area into it.
    Copy {
        #[structopt(parse(try_from_str = parse_byte))]
        src: u8,
        #[structopt(parse(try_from_str = parse_byte))]
        dst: u8,
    },
    /// Report whether an area is fully erased.
    Erased {
        #[structopt(parse(try_from_str = parse_byte))]
        id: u8,
    },
}

const SCRATCH_SIZE: usize = 4096;

fn validate(args: &[AreaArg], capacity: usize) -> Result<(), CliError> {
    let mut ids = HashSet::new();
    for arg in args {
        if !ids.insert(arg.id) {
            return Err(CliError::Config(format!("area {} defined twice", arg.id)));
        }
        if arg.size == 0 {
            return Err(CliError::Config(format!("area {} is empty", arg.id)));
        }
        match arg.offset.checked_add(arg.size) {
            Some(end) if end <= capacity => {}
            _ => {
                return Err(CliError::Config(format!(
                    "area {} (0x{:x}+0x{:x}) exceeds device of 0x{:x} bytes",
                    arg.id, arg.offset, arg.size, capacity
                )))
            }
        }
    }
    Ok(())
}

fn hexdump<W: Write>(out: &mut W, base: usize, data: &[u8]) -> io::Result<()> {
    for (i, line) in data.chunks(16).enumerate() {
        let bytes: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let text: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        writeln!(out, "{:08x}  {:<47}  {}", base + i * 16, bytes.join(" "), text)?;
    }
    Ok(())
}

fn list<W: Write>(out: &mut W, table: &AreaTable<'_>) -> io::Result<()> {
    writeln!(out, "{:>3}  {:>10}  {:>10}  label", "id", "offset", "size")?;
    for area in table.iter() {
        writeln!(
            out,
            "{:>3}  0x{:08x}  0x{:08x}  {}",
            area.id(),
            area.offset(),
            area.size(),
            area.label().unwrap_or("-")
        )?;
    }
    Ok(())
}

/// Dump `len` bytes of an area, one scratch buffer at a time.
fn dump_area<W: Write>(
    out: &mut W,
    area: &Area<'_>,
    offset: usize,
    len: usize,
    scratch: &mut [u8],
) -> Result<(), CliError> {
    match offset.checked_add(len) {
        Some(end) if end <= area.size() => {}
        _ => return Err(ErrorKind::OutOfBounds.into()),
    }
    let mut pos = 0;
    while pos < len {
        let num_bytes = core::cmp::min(len - pos, scratch.len());
        area.read(offset + pos, &mut scratch[..num_bytes])?;
        hexdump(out, offset + pos, &scratch[..num_bytes])?;
        pos += num_bytes;
    }
    Ok(())
}

fn run_command<W: Write>(
    out: &mut W,
    cmd: &Command,
    table: &AreaTable<'_>,
) -> Result<(), CliError> {
    let mut scratch = vec![0u8; SCRATCH_SIZE];
    match *cmd {
        Command::List => list(out, table)?,
        Command::Read { id, offset, len } => {
            let area = table.open(id)?;
            dump_area(out, &area, offset, len, &mut scratch)?;
            area.close();
        }
        Command::Write {
            id,
            offset,
            ref file,
        } => {
            let area = table.open(id)?;
            let data = fs::read(file)?;
            if data.len() % area.align() != 0 {
                warn!(
                    "{} bytes is not a multiple of the {} byte write block",
                    data.len(),
                    area.align()
                );
            }
            area.write(offset, &data)?;
            info!("wrote {} bytes to area {} at 0x{:x}", data.len(), id, offset);
            area.close();
        }
        Command::Erase { id, offset, len } => {
            let area = table.open(id)?;
            area.erase(offset, len)?;
            area.close();
        }
        Command::Crc { id } => {
            let area = table.open(id)?;
            let crc = area.crc32(0, area.size(), &mut scratch)?;
            writeln!(out, "0x{:08x}", crc)?;
            area.close();
        }
        Command::Sectors { id } => {
            let area = table.open(id)?;
            let max: usize = area
                .device()
                .page_layout()
                .iter()
                .map(|run| run.pages_count)
                .sum();
            let mut sectors = vec![Sector::default(); max];
            let count = area.sectors(&mut sectors)?;
            for sector in &sectors[..count] {
                writeln!(out, "0x{:08x}  0x{:08x}", sector.offset, sector.size)?;
            }
            area.close();
        }
        Command::Copy { src, dst } => {
            let src = table.open(src)?;
            let dst = table.open(dst)?;
            copy_area(&src, &dst, &mut scratch)?;
            src.close();
            dst.close();
        }
        Command::Erased { id } => {
            let area = table.open(id)?;
            let erased = area.is_erased(0, area.size(), &mut scratch)?;
            writeln!(out, "{}", if erased { "erased" } else { "programmed" })?;
            area.close();
        }
    }
    Ok(())
}

/// Erase the destination and copy the whole source area into it.
///
/// The destination is erased before anything is read, so it must not share device bytes with
/// the source.
fn copy_area(src: &Area<'_>, dst: &Area<'_>, scratch: &mut [u8]) -> Result<(), CliError> {
    let same_device = std::ptr::eq(
        src.device() as *const dyn FlashDevice as *const u8,
        dst.device() as *const dyn FlashDevice as *const u8,
    );
    let src_start = src.descriptor().offset();
    let dst_start = dst.descriptor().offset();
    let overlaps = src_start < dst_start.saturating_add(src.size())
        && dst_start < src_start.saturating_add(src.size());
    if same_device && overlaps {
        return Err(CliError::Config(format!(
            "areas {} and {} overlap, refusing to copy",
            src.id(),
            dst.id()
        )));
    }

    dst.flatten(0, src.size())?;
    src.copy_to(0, dst, 0, src.size(), scratch)?;
    Ok(())
}

fn run<W: Write>(opt: &Opt, out: &mut W) -> Result<(), CliError> {
    let device = FileDevice::load(opt)?;
    validate(&opt.areas, device.capacity())?;

    let areas: Vec<AreaDescriptor<'_>> = opt
        .areas
        .iter()
        .map(|arg| {
            let desc = AreaDescriptor::new(arg.id, &device, arg.offset, arg.size);
            match &arg.label {
                Some(label) => desc.with_label(label),
                None => desc,
            }
        })
        .collect();
    let table = AreaTable::new(&areas);

    run_command(out, &opt.cmd, &table)?;
    device.save(opt)
}

fn main() {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .format_timestamp_nanos()
        .filter_level(level)
        .init();

    let stdout = io::stdout();
    if let Err(err) = run(&opt, &mut stdout.lock()) {
        eprintln!("flashmap: {}", err);
        std::process::exit(err.exit_code());
    }
}
