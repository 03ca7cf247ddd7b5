//! Serializing and parsing one archive's `archive.pallas`: its per-process definition
//! tables (strings, regions, groups, comms) plus the ids of its thread files.

use pallas_core::{CommDef, DefinitionTables, GroupDef, RegionDef, Result, StringTable};

use crate::byteio::{ByteWriter, Deserializable, Serializable, SliceReader};
use crate::chunk::{self, ChunkKind};
use crate::codec::{read_vec, write_vec};

pub fn write_archive(archive_id: u32, defs: &DefinitionTables, thread_ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    chunk::write_header(&mut out);

    let mut index = Vec::new();
    index.write_u32(archive_id);
    write_vec_u32(&mut index, thread_ids);
    chunk::write_chunk(&mut out, ChunkKind::ArchiveIndex, &index);

    chunk::write_chunk(&mut out, ChunkKind::StringTable, &defs.strings.to_bytes());

    let mut regions = Vec::new();
    write_vec(&mut regions, defs.regions.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::RegionTable, &regions);

    let mut groups = Vec::new();
    write_vec(&mut groups, defs.groups.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::GroupTable, &groups);

    let mut comms = Vec::new();
    write_vec(&mut comms, defs.comms.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::CommTable, &comms);

    out
}

pub struct ParsedArchive {
    pub archive_id: u32,
    pub definitions: DefinitionTables,
    pub thread_ids: Vec<u32>,
}

pub fn read_archive(bytes: &[u8]) -> Result<ParsedArchive> {
    let mut r = SliceReader::new(bytes);
    chunk::read_header(&mut r)?;
    let chunks = chunk::read_chunks(&mut r)?;
    chunk::warn_on_unknown_chunks(&chunks);

    let mut index_r = SliceReader::new(chunk::require(&chunks, ChunkKind::ArchiveIndex)?);
    let archive_id = index_r.read_u32()?;
    let thread_ids = read_vec_u32(&mut index_r)?;

    let strings = StringTable::read_from_bytes(chunk::require(&chunks, ChunkKind::StringTable)?)?;

    let mut regions_r = SliceReader::new(chunk::require(&chunks, ChunkKind::RegionTable)?);
    let regions: Vec<RegionDef> = read_vec(&mut regions_r)?;

    let mut groups_r = SliceReader::new(chunk::require(&chunks, ChunkKind::GroupTable)?);
    let groups: Vec<GroupDef> = read_vec(&mut groups_r)?;

    let mut comms_r = SliceReader::new(chunk::require(&chunks, ChunkKind::CommTable)?);
    let comms: Vec<CommDef> = read_vec(&mut comms_r)?;

    let definitions = DefinitionTables {
        strings,
        regions: pallas_core::Table::from_vec(regions),
        groups: pallas_core::Table::from_vec(groups),
        comms: pallas_core::Table::from_vec(comms),
    };

    for comm in definitions.comms.iter() {
        if definitions.groups.get(comm.group.0).is_none() {
            return Err(pallas_core::PallasError::format(format!(
                "comm references nonexistent group {:?}",
                comm.group
            )));
        }
    }

    Ok(ParsedArchive { archive_id, definitions, thread_ids })
}

fn write_vec_u32<W: ByteWriter>(w: &mut W, values: &[u32]) {
    w.write_u64(values.len() as u64);
    for &v in values {
        w.write_u32(v);
    }
}

fn read_vec_u32(r: &mut SliceReader) -> Result<Vec<u32>> {
    let len = r.read_u64()? as usize;
    (0..len).map(|_| r.read_u32()).collect()
}
