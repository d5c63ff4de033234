use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};
use memmap2::MmapOptions;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use tch::{nn, Device, Kind, Tensor};

use crate::error::{ModelError, Result};

const FORMAT_KEY: &str = "format";
const FORMAT_VALUE: &str = "charlm";
const VOCAB_KEY: &str = "vocab";

/// File in a checkpoint directory naming the most recently written snapshot.
pub const LATEST_POINTER: &str = "latest";

/// Write every variable of `vs` as F32 safetensors. `alphabet` is the
/// vocabulary in id order; it is stored in the metadata so a reload can check
/// that ids still map to the same characters.
pub fn save_snapshot<P: AsRef<Path>>(vs: &nn::VarStore, path: P, alphabet: &str) -> Result<()> {
    let mut storage: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();

    for (name, var) in vs.variables() {
        let shape: Vec<usize> = var.size().iter().map(|&d| d as usize).collect();
        let flat = var
            .detach()
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous()
            .view([-1]);
        let values = Vec::<f32>::try_from(&flat)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        storage.push((name, shape, bytes));
    }

    let views: HashMap<String, TensorView<'_>> = storage
        .iter()
        .map(|(name, shape, bytes)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes.as_slice())?;
            Ok((name.clone(), view))
        })
        .collect::<Result<_>>()?;

    let mut metadata = HashMap::new();
    metadata.insert(FORMAT_KEY.to_string(), FORMAT_VALUE.to_string());
    metadata.insert(VOCAB_KEY.to_string(), alphabet.to_string());

    safetensors::serialize_to_file(&views, &Some(metadata), path.as_ref())?;
    info!("Saved {} tensors to {:?}", storage.len(), path.as_ref());
    Ok(())
}

/// Restore parameters into an already constructed `vs`.
///
/// The snapshot must hold exactly the variables of `vs`, with equal shapes,
/// and must have been written with the same vocabulary. Nothing is copied
/// unless every check passes.
pub fn load_snapshot<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P, alphabet: &str) -> Result<()> {
    let file = File::open(path.as_ref())?;
    let buffer = unsafe { MmapOptions::new().map(&file)? };

    let (_, header) = SafeTensors::read_metadata(&buffer)?;
    let stored_alphabet = header
        .metadata()
        .as_ref()
        .and_then(|m| m.get(VOCAB_KEY))
        .ok_or_else(|| ModelError::SnapshotMismatch("snapshot carries no vocabulary".to_string()))?;
    if stored_alphabet != alphabet {
        return Err(ModelError::SnapshotMismatch(format!(
            "vocabulary differs: snapshot has {} symbols {:?}, current has {} symbols {:?}",
            stored_alphabet.chars().count(),
            stored_alphabet,
            alphabet.chars().count(),
            alphabet
        )));
    }

    let tensors = SafeTensors::deserialize(&buffer)?;
    let mut variables = vs.variables();
    let device = vs.device();

    let mut staged: Vec<(String, Tensor)> = Vec::with_capacity(variables.len());
    for (name, view) in tensors.tensors() {
        let var = variables.get(&name).ok_or_else(|| {
            ModelError::SnapshotMismatch(format!("tensor {} is not a model parameter", name))
        })?;
        if view.dtype() != Dtype::F32 {
            return Err(ModelError::SnapshotMismatch(format!(
                "tensor {} has dtype {:?}, expected F32",
                name,
                view.dtype()
            )));
        }
        let shape: Vec<i64> = view.shape().iter().map(|&d| d as i64).collect();
        if shape != var.size() {
            return Err(ModelError::SnapshotMismatch(format!(
                "tensor {} has shape {:?}, model expects {:?}",
                name,
                shape,
                var.size()
            )));
        }
        let tensor = Tensor::f_from_data_size(view.data(), &shape, Kind::Float)?.to_device(device);
        staged.push((name, tensor));
    }

    if staged.len() != variables.len() {
        let mut missing: Vec<&String> = variables
            .keys()
            .filter(|k| !staged.iter().any(|(n, _)| n == *k))
            .collect();
        missing.sort();
        return Err(ModelError::SnapshotMismatch(format!("missing parameters {:?}", missing)));
    }

    tch::no_grad(|| -> Result<()> {
        for (name, tensor) in &staged {
            if let Some(var) = variables.get_mut(name) {
                var.f_copy_(tensor)?;
                debug!("Loaded tensor: {}", name);
            }
        }
        Ok(())
    })?;

    info!("Restored {} tensors from {:?}", staged.len(), path.as_ref());
    Ok(())
}

/// Record `snapshot` as the newest snapshot of `dir`.
pub fn write_latest_pointer<P: AsRef<Path>>(dir: P, snapshot: &Path) -> Result<()> {
    let name = snapshot
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ModelError::SnapshotMismatch(format!("bad snapshot path {:?}", snapshot)))?;
    std::fs::write(dir.as_ref().join(LATEST_POINTER), name)?;
    Ok(())
}

/// Snapshot named by the pointer in `dir`, if one was written.
pub fn read_latest_pointer<P: AsRef<Path>>(dir: P) -> Result<Option<PathBuf>> {
    let pointer = dir.as_ref().join(LATEST_POINTER);
    if !pointer.exists() {
        return Ok(None);
    }
    let name = std::fs::read_to_string(&pointer)?;
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    Ok(Some(dir.as_ref().join(name)))
}
