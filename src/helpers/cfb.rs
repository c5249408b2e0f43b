//! OLE Compound File Binary (CFB) reader: the container of legacy `.xls`
//! workbooks. Only reading named streams is supported.

use crate::error::RustyChunkerError;
use crate::helpers::bytes::u16_at;
use crate::helpers::bytes::u64_at;
use crate::helpers::bytes::usize_at;
use crate::helpers::bytes::usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
/// Sector ids above this mark free, chain end, FAT or DIFAT sectors
const MAX_REG_SECT: usize = 0xFFFF_FFFA;
/// Streams smaller than this live in the mini stream
const MINI_STREAM_CUTOFF: usize = 4096;
const MINI_SECTOR_SIZE: usize = 64;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const ROOT_ENTRY: &str = "Root Entry";

#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Sector '{0}' is outside the file")]
    SectorIndexError(usize),

    #[error("Sector chain starting at '{0}' does not terminate")]
    SectorChainError(usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// An opened compound file, held in memory.
pub(crate) struct Cfb {
    /// Stream entries by name
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    /// Allocation table of the 64-byte mini sectors
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Reads the whole compound file and indexes its directory.
    pub(crate) fn new<R: Read>(reader: &mut R) -> Result<Cfb, RustyChunkerError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }

        let header = Header::new(&data[..HEADER_SIZE])?;
        let size = header.sector_size()?;
        // The header occupies sector -1
        let sectors = Sectors { data, size, offset: size };
        let file_allocation_table = load_file_allocation_table(&sectors, &header)?;
        let directories = load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = if header.mini_file_allocation_table_sector_count > 0 {
            let bytes = read_chain(&file_allocation_table, &sectors, header.mini_file_allocation_table_sector_shift)?;
            usize_iter(&bytes).collect()
        } else {
            Vec::new()
        };
        let mini_data = match directories.get(ROOT_ENTRY) {
            Some(root) if root.count > 0 => {
                let mut data = read_chain(&file_allocation_table, &sectors, root.index)?;
                data.truncate(root.count);
                data
            }
            _ => Vec::new(),
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors: Sectors { data: mini_data, size: MINI_SECTOR_SIZE, offset: 0 },
        })
    }

    /// Reads a stream by name, `None` when the file has no such stream.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, RustyChunkerError> {
        let Some(directory) = self.directories.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.count < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
        } else {
            read_chain(&self.file_allocation_table, &self.sectors, directory.index)?
        };
        if bytes.len() < directory.count {
            Err(CfbError::FileFormatError)?;
        }
        bytes.truncate(directory.count);
        Ok(Some(bytes))
    }
}

/// Collects the FAT from the sectors listed in the header and the DIFAT chain.
fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, RustyChunkerError> {
    let mut double_indirect_file_allocation_table: Vec<usize> = usize_iter(&sectors.data[76..HEADER_SIZE]).collect();
    let mut count = 0usize;
    let mut index = header.double_indirect_file_allocation_table_shift;
    while index <= MAX_REG_SECT {
        if count >= header.double_indirect_file_allocation_table_count {
            Err(CfbError::SectorChainError(header.double_indirect_file_allocation_table_shift))?;
        }
        double_indirect_file_allocation_table.extend(usize_iter(sectors.get(index)?));
        // The last entry of a DIFAT sector links the next one
        index = double_indirect_file_allocation_table.pop().ok_or(CfbError::FileFormatError)?;
        count += 1;
    }
    if count != header.double_indirect_file_allocation_table_count {
        Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?;
    }

    let mut file_allocation_table = Vec::new();
    let mut count = 0usize;
    for index in double_indirect_file_allocation_table.into_iter().filter(|index| *index <= MAX_REG_SECT) {
        file_allocation_table.extend(usize_iter(sectors.get(index)?));
        count += 1;
    }
    if count != header.file_allocation_table_count {
        Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?;
    }
    Ok(file_allocation_table)
}

/// Indexes the stream and storage entries of the directory chain by name.
fn load_directories(
    file_allocation_table: &[usize],
    sectors: &Sectors,
    header: &Header,
) -> Result<HashMap<String, Directory>, RustyChunkerError> {
    let bytes = read_chain(file_allocation_table, sectors, header.directory_shift)?;
    let mut directories = HashMap::new();
    for entry in bytes.chunks_exact(DIRECTORY_ENTRY_SIZE) {
        if let Some((name, directory)) = Directory::new(entry, header.major_version)? {
            directories.insert(name, directory);
        }
    }
    if directories.is_empty() {
        Err(CfbError::RootDirectoryError)?;
    }
    Ok(directories)
}

/// Concatenates the sectors of the chain starting at `index`.
fn read_chain(allocation_table: &[usize], sectors: &Sectors, index: usize) -> Result<Vec<u8>, RustyChunkerError> {
    let start = index;
    let mut content = Vec::new();
    let mut index = index;
    let mut steps = 0usize;
    while index <= MAX_REG_SECT {
        steps += 1;
        if steps > allocation_table.len() {
            Err(CfbError::SectorChainError(start))?;
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *allocation_table.get(index).ok_or(CfbError::SectorIndexError(index))?;
    }
    Ok(content)
}

/// Fixed-size sectors over a byte buffer, numbered from `offset`.
struct Sectors {
    data: Vec<u8>,
    size: usize,
    offset: usize,
}

impl Sectors {
    /// The sector at `index`; the last sector of a file may be short.
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let lower = index
            .checked_mul(self.size)
            .and_then(|position| position.checked_add(self.offset))
            .filter(|lower| *lower < self.data.len())
            .ok_or(CfbError::SectorIndexError(index))?;
        let upper = self.data.len().min(lower + self.size);
        Ok(&self.data[lower..upper])
    }
}

/// The fields of the 512-byte header this reader needs.
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, RustyChunkerError> {
        if u64_at(data, 0)? != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }
        Ok(Header {
            major_version: u16_at(data, 26)?,
            sector_shift: u16_at(data, 30)?,
            file_allocation_table_count: usize_at(data, 44)?,
            directory_shift: usize_at(data, 48)?,
            mini_file_allocation_table_sector_shift: usize_at(data, 60)?,
            mini_file_allocation_table_sector_count: usize_at(data, 64)?,
            double_indirect_file_allocation_table_shift: usize_at(data, 68)?,
            double_indirect_file_allocation_table_count: usize_at(data, 72)?,
        })
    }

    /// Version 3 files use 512-byte sectors, version 4 files 4096-byte ones.
    fn sector_size(&self) -> Result<usize, CfbError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            (4, 12) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift)),
        }
    }
}

/// Start sector and byte size of a directory entry.
struct Directory {
    index: usize,
    count: usize,
}

impl Directory {
    /// Parses a 128-byte entry; unused entries give `None`.
    fn new(bytes: &[u8], major_version: u16) -> Result<Option<(String, Directory)>, RustyChunkerError> {
        // Type 0 marks an unallocated entry
        if bytes[66] == 0 {
            return Ok(None);
        }
        let length = (u16_at(bytes, 64)? as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..length]);
        let name = name.split('\0').next().unwrap_or_default().to_owned();

        let index = usize_at(bytes, 116)?;
        let mut count = u64_at(bytes, 120)?;
        // Version 3 writers may leave garbage in the high half
        if major_version == 3 {
            count &= 0xFFFF_FFFF;
        }
        Ok(Some((name, Directory { index, count: count as usize })))
    }
}
