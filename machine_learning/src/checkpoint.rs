use std::{collections::HashMap, fs, path::Path};

use safetensors::{
    SafeTensors,
    tensor::{self, Dtype, TensorView},
};

use crate::{MlErr, Result};

/// A named `f32` tensor to be written into a checkpoint.
pub struct Tensor<'a> {
    pub name: &'a str,
    pub data: &'a [f32],
    pub shape: Vec<usize>,
}

impl<'a> Tensor<'a> {
    /// A one dimensional tensor spanning the whole slice.
    pub fn flat(name: &'a str, data: &'a [f32]) -> Self {
        Self {
            name,
            data,
            shape: vec![data.len()],
        }
    }
}

/// Writes the given tensors into a safetensors file, replacing it if it exists.
///
/// # Arguments
/// * `path` - Where to write the file.
/// * `tensors` - The tensors to store.
pub fn save<P: AsRef<Path>>(path: P, tensors: &[Tensor<'_>]) -> Result<()> {
    let mut views = HashMap::new();

    for t in tensors {
        let bytes: &[u8] = bytemuck::cast_slice(t.data);
        let view = TensorView::new(Dtype::F32, t.shape.clone(), bytes)?;
        views.insert(t.name.to_string(), view);
    }

    let serialized = tensor::serialize(&views, &None)?;
    fs::write(path, serialized)?;
    Ok(())
}

/// Reads the `f32` tensor called `name` from a safetensors file, flattened in row-major order.
pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Vec<f32>> {
    let buf = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&buf)?;

    let missing = || MlErr::MissingTensor {
        name: name.to_string(),
    };

    let view = tensors.tensor(name).map_err(|_| missing())?;
    if view.dtype() != Dtype::F32 {
        return Err(missing());
    }

    let data = view
        .data()
        .chunks_exact(size_of::<f32>())
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect();

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_tensors_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let backbone = [0.5, -1.25, 3.];
        let head = [7.; 4];

        save(
            &path,
            &[
                Tensor::flat("backbone", &backbone),
                Tensor {
                    name: "head",
                    data: &head,
                    shape: vec![2, 2],
                },
            ],
        )
        .unwrap();

        assert_eq!(load(&path, "backbone").unwrap(), backbone);
        assert_eq!(load(&path, "head").unwrap(), head);
    }

    #[test]
    fn unknown_tensor_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        save(&path, &[Tensor::flat("backbone", &[1.])]).unwrap();

        match load(&path, "head") {
            Err(MlErr::MissingTensor { name }) => assert_eq!(name, "head"),
            other => panic!("expected a missing tensor error, got {other:?}"),
        }
    }

    #[test]
    fn shape_must_cover_the_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let data = [1., 2., 3.];

        let res = save(
            &path,
            &[Tensor {
                name: "bad",
                data: &data,
                shape: vec![2, 2],
            }],
        );
        assert!(res.is_err());
    }
}
