//! Phase orchestration: one partitioning pass, then voxelize and insert each
//! partition in index order.
//!
//! Partition order is mandatory, not an optimization: Morton ranges increase
//! with the partition index, so feeding partitions in order is what gives the
//! octree builder its globally monotone input. A partition's buffers are
//! dropped before the next one allocates, keeping peak memory at one
//! partition's worth.

use log::{debug, info};

use crate::error::{ForgeError, ForgeResult};
use crate::grid::GridParameters;
use crate::mesh::{MeshHeader, TriangleReader};
use crate::octree::{OctreeBuilder, OctreeFileWriter};
use crate::partition::{estimate_partitions, partition, PartitionSet};
use crate::voxelize::{voxelize_partition, CpuEvaluator};
use crate::BuildConfig;

/// Outcome of a completed build.
#[derive(Debug, Clone, Copy)]
pub struct BuildStats {
    pub n_partitions: u64,
    pub n_voxels: u64,
    pub n_nodes: u64,
}

/// Run the whole pipeline: read the mesh header, plan and write partitions,
/// voxelize each in Morton order, and stream the octree to disk.
///
/// On success the intermediate partition files are deleted and the `.octree`
/// header is in place. On any fatal error the partial octree output and the
/// partition files are removed before the error is returned; completion is
/// only ever signaled by a readable header.
pub fn build_svo(config: &BuildConfig) -> ForgeResult<BuildStats> {
    config.validate()?;

    let mesh = MeshHeader::read(&config.input)?;
    if !mesh.files_exist() {
        return Err(ForgeError::MissingFiles {
            path: mesh.data_path(),
        });
    }
    if !mesh.geometry_only {
        return Err(ForgeError::InvalidConfig {
            field: "input",
            value: config.input.display().to_string(),
            reason: "mesh carries non-geometry payload; this builder is geometry-only",
        });
    }

    let n_partitions = estimate_partitions(config.gridsize, config.memory_budget)?;
    info!(
        "partitioning {} triangles into {} partition(s)",
        mesh.n_triangles, n_partitions
    );
    let mut reader =
        TriangleReader::open(&mesh.data_path(), mesh.n_triangles, config.input_buffer)?;
    let trip = partition(
        &mesh,
        n_partitions,
        config.gridsize,
        &mut reader,
        mesh.base_path(),
    )?;
    drop(reader);

    let result = build_from_partitions(config, &trip).and_then(|stats| {
        // completion is only signaled once the intermediates are gone too
        trip.remove_files()?;
        Ok(stats)
    });
    match result {
        Ok(stats) => {
            info!(
                "svo complete: {} voxels in {} nodes",
                stats.n_voxels, stats.n_nodes
            );
            Ok(stats)
        }
        Err(e) => {
            // never leave a partial octree behind
            OctreeFileWriter::remove_files(&config.output);
            let _ = trip.remove_files();
            Err(e)
        }
    }
}

fn build_from_partitions(config: &BuildConfig, trip: &PartitionSet) -> ForgeResult<BuildStats> {
    if !trip.files_exist() {
        return Err(ForgeError::MissingFiles {
            path: trip.header_path(),
        });
    }
    let grid = GridParameters::new(&trip.bbox, trip.gridsize, trip.n_partitions)?;

    let writer = OctreeFileWriter::create(&config.output, trip.gridsize, config.generate_levels)?;
    let mut builder = OctreeBuilder::new(writer, trip.gridsize, config.generate_levels)?;
    let evaluator = CpuEvaluator;

    for i in 0..trip.n_partitions {
        let part = trip.partition(i);
        if part.n_triangles == 0 {
            continue;
        }
        info!("voxelizing partition {} ({} triangles)", i, part.n_triangles);
        let buffer_size = config.input_buffer.min(part.n_triangles as usize);
        let mut reader = TriangleReader::open(&part.data_path, part.n_triangles, buffer_size)?;
        let occupancy = voxelize_partition(
            &mut reader,
            &grid,
            part.range,
            config.sparseness_limit,
            config.memory_budget,
            &evaluator,
        )?;
        debug!("partition {}: {} new voxels", i, occupancy.nfilled());

        for code in occupancy.codes() {
            builder.add_voxel(code)?;
        }
        // occupancy and reader drop here, before the next partition allocates
    }

    builder.finalize_tree()?;
    let n_voxels = builder.n_voxels();
    let n_nodes = builder.n_nodes();
    builder.into_sink().finish(n_voxels)?;

    Ok(BuildStats {
        n_partitions: trip.n_partitions,
        n_voxels,
        n_nodes,
    })
}
