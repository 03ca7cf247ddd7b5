//! Serializing and parsing `main.pallas`: the global definition tables (strings, regions,
//! groups, comms, plus the location-group/location tree) and the set of archive ids.

use pallas_core::{GlobalDefinitionTables, LocationDef, LocationGroupDef, Result, Table};

use crate::byteio::{ByteWriter, Deserializable, Serializable, SliceReader};
use crate::chunk::{self, ChunkKind};
use crate::codec::{read_vec, write_vec};

pub fn write_global(defs: &GlobalDefinitionTables, archive_ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    chunk::write_header(&mut out);

    let mut index = Vec::new();
    write_vec_u32(&mut index, archive_ids);
    chunk::write_chunk(&mut out, ChunkKind::ArchiveIndex, &index);

    chunk::write_chunk(&mut out, ChunkKind::StringTable, &defs.base.strings.to_bytes());

    let mut regions = Vec::new();
    write_vec(&mut regions, defs.base.regions.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::RegionTable, &regions);

    let mut groups = Vec::new();
    write_vec(&mut groups, defs.base.groups.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::GroupTable, &groups);

    let mut comms = Vec::new();
    write_vec(&mut comms, defs.base.comms.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::CommTable, &comms);

    let mut location_groups = Vec::new();
    write_vec(&mut location_groups, defs.location_groups.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::LocationGroupTable, &location_groups);

    let mut locations = Vec::new();
    write_vec(&mut locations, defs.locations.as_slice());
    chunk::write_chunk(&mut out, ChunkKind::LocationTable, &locations);

    out
}

pub struct ParsedGlobal {
    pub definitions: GlobalDefinitionTables,
    pub archive_ids: Vec<u32>,
}

pub fn read_global(bytes: &[u8]) -> Result<ParsedGlobal> {
    let mut r = SliceReader::new(bytes);
    chunk::read_header(&mut r)?;
    let chunks = chunk::read_chunks(&mut r)?;
    chunk::warn_on_unknown_chunks(&chunks);

    let mut index_r = SliceReader::new(chunk::require(&chunks, ChunkKind::ArchiveIndex)?);
    let archive_ids = read_vec_u32(&mut index_r)?;

    let strings =
        pallas_core::StringTable::read_from_bytes(chunk::require(&chunks, ChunkKind::StringTable)?)?;

    let mut regions_r = SliceReader::new(chunk::require(&chunks, ChunkKind::RegionTable)?);
    let regions = read_vec(&mut regions_r)?;

    let mut groups_r = SliceReader::new(chunk::require(&chunks, ChunkKind::GroupTable)?);
    let groups = read_vec(&mut groups_r)?;

    let mut comms_r = SliceReader::new(chunk::require(&chunks, ChunkKind::CommTable)?);
    let comms = read_vec(&mut comms_r)?;

    let mut lg_r = SliceReader::new(chunk::require(&chunks, ChunkKind::LocationGroupTable)?);
    let location_groups: Vec<LocationGroupDef> = read_vec(&mut lg_r)?;

    let mut loc_r = SliceReader::new(chunk::require(&chunks, ChunkKind::LocationTable)?);
    let locations: Vec<LocationDef> = read_vec(&mut loc_r)?;

    let definitions = GlobalDefinitionTables {
        base: pallas_core::DefinitionTables {
            strings,
            regions: Table::from_vec(regions),
            groups: Table::from_vec(groups),
            comms: Table::from_vec(comms),
        },
        location_groups: Table::from_vec(location_groups),
        locations: Table::from_vec(locations),
    };

    for lg in definitions.location_groups.iter() {
        if !lg.parent.is_none() && definitions.location_groups.get(lg.parent.0).is_none() {
            return Err(pallas_core::PallasError::format(
                "location group references a nonexistent parent",
            ));
        }
    }
    for loc in definitions.locations.iter() {
        if !loc.parent.is_none() && definitions.location_groups.get(loc.parent.0).is_none() {
            return Err(pallas_core::PallasError::format(
                "location references a nonexistent location group",
            ));
        }
    }

    Ok(ParsedGlobal { definitions, archive_ids })
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

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_core::LocationGroupRef;

    #[test]
    fn global_defs_round_trip_with_location_tree() {
        let mut defs = GlobalDefinitionTables::new();
        let name = defs.base.strings.intern("node0");
        let root = defs
            .location_groups
            .push(LocationGroupDef { name, parent: LocationGroupRef::NONE });
        defs.locations.push(LocationDef { name, parent: root });

        let bytes = write_global(&defs, &[0, 1]);
        let parsed = read_global(&bytes).unwrap();
        assert_eq!(parsed.archive_ids, vec![0, 1]);
        assert_eq!(parsed.definitions.location_groups.len(), 1);
        assert!(parsed.definitions.location_groups.get(0).unwrap().parent.is_none());
    }

    #[test]
    fn dangling_location_parent_is_rejected() {
        let mut defs = GlobalDefinitionTables::new();
        let name = defs.base.strings.intern("x");
        defs.locations.push(LocationDef { name, parent: LocationGroupRef::new(7) });
        let bytes = write_global(&defs, &[]);
        assert!(read_global(&bytes).is_err());
    }
}
