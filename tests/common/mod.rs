use std::{fs, path::Path};

use cifar_vgg::dataset::IMAGE_BYTES;

/// Writes a tiny CIFAR-100 binary distribution under `<project>/data`.
pub fn write_cifar100(project: &Path, train: usize, test: usize) {
    let dir = project.join("data").join("cifar-100-binary");
    fs::create_dir_all(&dir).unwrap();

    let records = |count: usize| -> Vec<u8> {
        (0..count)
            .flat_map(|i| {
                let label = i % 4;
                let mut record = vec![0, label as u8];
                record.extend((0..IMAGE_BYTES).map(|p| ((p * (i + 1) + 31 * label) % 256) as u8));
                record
            })
            .collect()
    };
    fs::write(dir.join("train.bin"), records(train)).unwrap();
    fs::write(dir.join("test.bin"), records(test)).unwrap();
}
