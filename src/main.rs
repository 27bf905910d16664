fn main() -> anyhow::Result<()> {
    forestfy_lib::run()
}
